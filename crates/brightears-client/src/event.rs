//! Client events and actions.

use brightears_core::{Message, MessageDraft, MessageId, Page, PageRequest, SendMessageRequest, StreamEvent};

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Opening the stream and forwarding what it yields
/// - Driving time forward via ticks
/// - Reporting the outcome of every outbound call it executed
/// - Forwarding UI intents (send, load older, typing, reconnect)
///
/// Generic over `I` (Instant type) to support both production
/// (`tokio::time::Instant`) and simulation (virtual instant) environments.
#[derive(Debug, Clone)]
pub enum ChatEvent<I = std::time::Instant> {
    /// Conversation screen mounted (or enabled): connect and load history.
    Start,

    /// Conversation enabled or disabled by the host.
    ///
    /// Disabling behaves like [`ChatEvent::Disconnect`]; enabling behaves like
    /// [`ChatEvent::Start`].
    SetEnabled {
        /// New flag.
        enabled: bool,
    },

    /// The stream requested by [`ChatAction::OpenStream`] is open.
    StreamOpened,

    /// Typed event received on the stream.
    Received(StreamEvent),

    /// The stream failed to open, errored, or ended.
    StreamFailed {
        /// Human readable cause.
        reason: String,
    },

    /// Time tick for deadline processing.
    ///
    /// The caller should tick at [`crate::ChatClient::next_deadline`] at the
    /// latest.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Caller-requested disconnect. No automatic reconnect follows.
    Disconnect,

    /// User pressed "reconnect": reset attempts and open immediately.
    ManualReconnect,

    /// Send a new message.
    SendMessage(MessageDraft),

    /// Server acknowledged an optimistic message.
    MessageSent {
        /// Temporary id the message was posted under.
        temp_id: MessageId,
        /// Server copy.
        message: Message,
    },

    /// Posting an optimistic message failed.
    MessageFailed {
        /// Temporary id the message was posted under.
        temp_id: MessageId,
        /// Human readable cause.
        reason: String,
    },

    /// Re-post a failed message.
    RetryMessage {
        /// Id of the failed message.
        id: MessageId,
    },

    /// Fetch the newest page of history.
    LoadInitial,

    /// Fetch the page before the oldest loaded message.
    LoadMore,

    /// A page request completed.
    PageLoaded {
        /// Id of the request from [`PageRequest::id`].
        request_id: u64,
        /// Page contents.
        page: Page,
    },

    /// A page request failed.
    PageFailed {
        /// Id of the request from [`PageRequest::id`].
        request_id: u64,
        /// Human readable cause.
        reason: String,
    },

    /// Composer text changed.
    InputChanged {
        /// Full composer contents.
        text: String,
    },

    /// Composer lost focus.
    InputBlurred,

    /// Conversation screen unmounted.
    Shutdown,
}

impl<I> ChatEvent<I> {
    /// Short name used in logs and state errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::SetEnabled { .. } => "set enabled",
            Self::StreamOpened => "open stream",
            Self::Received(_) => "receive event",
            Self::StreamFailed { .. } => "fail stream",
            Self::Tick { .. } => "tick",
            Self::Disconnect => "disconnect",
            Self::ManualReconnect => "reconnect",
            Self::SendMessage(_) => "send message",
            Self::MessageSent { .. } => "confirm message",
            Self::MessageFailed { .. } => "fail message",
            Self::RetryMessage { .. } => "retry message",
            Self::LoadInitial => "load initial page",
            Self::LoadMore => "load more",
            Self::PageLoaded { .. } => "complete page",
            Self::PageFailed { .. } => "fail page",
            Self::InputChanged { .. } => "change input",
            Self::InputBlurred => "blur input",
            Self::Shutdown => "shut down",
        }
    }
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// Open the event stream. Report [`ChatEvent::StreamOpened`] or
    /// [`ChatEvent::StreamFailed`].
    OpenStream,

    /// Drop the current stream, if any. Anything it still yields is stale.
    CloseStream,

    /// POST a message. Report [`ChatEvent::MessageSent`] or
    /// [`ChatEvent::MessageFailed`] with the same `temp_id`.
    PostMessage {
        /// Id of the local copy.
        temp_id: MessageId,
        /// Request body.
        request: SendMessageRequest,
    },

    /// GET a page of history. Report [`ChatEvent::PageLoaded`] or
    /// [`ChatEvent::PageFailed`].
    FetchPage(PageRequest),

    /// POST a typing signal. Fire and forget.
    PostTyping {
        /// Whether the viewer is typing.
        is_typing: bool,
    },
}
