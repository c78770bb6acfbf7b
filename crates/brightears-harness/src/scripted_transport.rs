//! In-memory transport with a scriptable server.
//!
//! [`ScriptedTransport`] plays the server side of a conversation: it keeps a
//! message history for pagination, assigns server ids to sends, and exposes
//! the live stream so tests can push events, break it, or close it. Every
//! call is recorded for assertions.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use brightears_client::{ConversationId, EventStream, Transport};
use brightears_core::{
    DeliveryStatus, Message, MessageId, Page, PageRequest, SendMessageRequest, Sender, StreamEvent,
};
use chrono::{DateTime, TimeDelta, Utc};
use futures::{
    StreamExt,
    channel::mpsc::{UnboundedSender, unbounded},
};
use thiserror::Error;
use tracing::debug;

/// Failure injected by a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ScriptedError(pub String);

/// Call observed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Stream open attempt.
    OpenStream,
    /// Message POST.
    SendMessage(SendMessageRequest),
    /// History GET.
    FetchPage {
        /// Requested page size.
        limit: usize,
        /// Cursor.
        before: Option<MessageId>,
    },
    /// Typing POST.
    Typing(bool),
}

type LiveSender = UnboundedSender<Result<StreamEvent, ScriptedError>>;

#[derive(Debug, Default)]
struct Script {
    calls: Vec<Call>,
    history: Vec<Message>,
    live: Option<LiveSender>,
    open_failures: VecDeque<String>,
    send_failures: VecDeque<String>,
    page_failures: VecDeque<String>,
    open_latency: Duration,
    page_latency: Duration,
    echo_sends: bool,
    next_id: u64,
}

/// Scriptable in-memory [`Transport`].
///
/// Clones share the same script, so a test keeps one clone for control while
/// the runtime owns another.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    author: Sender,
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// Transport whose sends are attributed to `author`.
    pub fn new(author: Sender) -> Self {
        Self { author, script: Arc::new(Mutex::new(Script::default())) }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the server-side history (oldest first).
    pub fn seed_history(&self, messages: Vec<Message>) {
        self.lock().history = messages;
    }

    /// Fail the next `count` stream opens.
    pub fn fail_next_opens(&self, count: usize, reason: &str) {
        let mut script = self.lock();
        script.open_failures.extend(std::iter::repeat_n(reason.to_string(), count));
    }

    /// Fail the next message POST.
    pub fn fail_next_send(&self, reason: &str) {
        self.lock().send_failures.push_back(reason.to_string());
    }

    /// Fail the next history GET.
    pub fn fail_next_page(&self, reason: &str) {
        self.lock().page_failures.push_back(reason.to_string());
    }

    /// Delay every stream open by `latency`.
    pub fn set_open_latency(&self, latency: Duration) {
        self.lock().open_latency = latency;
    }

    /// Delay every history GET by `latency`. The page is cut from the
    /// history when the request arrives, not when it is answered.
    pub fn set_page_latency(&self, latency: Duration) {
        self.lock().page_latency = latency;
    }

    /// Broadcast accepted sends back over the live stream, as the server does.
    pub fn echo_sends(&self, echo: bool) {
        self.lock().echo_sends = echo;
    }

    /// Push an event on the live stream. Returns false if no stream is open.
    pub fn push(&self, event: StreamEvent) -> bool {
        let script = self.lock();
        script.live.as_ref().is_some_and(|live| live.unbounded_send(Ok(event)).is_ok())
    }

    /// Error the live stream and close it.
    pub fn fail_stream(&self, reason: &str) {
        if let Some(live) = self.lock().live.take() {
            let _ = live.unbounded_send(Err(ScriptedError(reason.to_string())));
        }
    }

    /// End the live stream cleanly.
    pub fn close_stream(&self) {
        self.lock().live = None;
    }

    /// True while a stream is open and its consumer has not dropped it.
    pub fn is_streaming(&self) -> bool {
        self.lock().live.as_ref().is_some_and(|live| !live.is_closed())
    }

    /// Every call observed so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of stream open attempts.
    pub fn open_count(&self) -> usize {
        self.lock().calls.iter().filter(|call| matches!(call, Call::OpenStream)).count()
    }

    /// Typing signals received, in order.
    pub fn typing_signals(&self) -> Vec<bool> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Typing(is_typing) => Some(*is_typing),
                _ => None,
            })
            .collect()
    }

    /// Server-side history.
    pub fn history(&self) -> Vec<Message> {
        self.lock().history.clone()
    }
}

/// Creation time of the `n`th server message.
fn server_time(n: u64) -> DateTime<Utc> {
    let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    base + TimeDelta::seconds(n as i64)
}

impl Transport for ScriptedTransport {
    type Error = ScriptedError;

    async fn open_stream(
        &self,
        _conversation: &ConversationId,
    ) -> Result<EventStream<ScriptedError>, ScriptedError> {
        let latency = {
            let mut script = self.lock();
            script.calls.push(Call::OpenStream);
            script.open_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut script = self.lock();
        if let Some(reason) = script.open_failures.pop_front() {
            debug!(%reason, "scripted open failure");
            return Err(ScriptedError(reason));
        }

        let (live, events) = unbounded();
        script.live = Some(live);
        Ok(events.boxed())
    }

    async fn send_message(
        &self,
        _conversation: &ConversationId,
        request: &SendMessageRequest,
    ) -> Result<Message, ScriptedError> {
        let mut script = self.lock();
        script.calls.push(Call::SendMessage(request.clone()));
        if let Some(reason) = script.send_failures.pop_front() {
            return Err(ScriptedError(reason));
        }

        script.next_id += 1;
        let message = Message {
            id: MessageId::new(format!("srv-{}", script.next_id)),
            content: request.content.clone(),
            message_type: request.message_type,
            attachment_url: request.attachment_url.clone(),
            created_at: server_time(script.next_id),
            status: DeliveryStatus::Sent,
            delivered_at: None,
            read_at: None,
            parent_message_id: request.parent_message_id.clone(),
            sender: self.author.clone(),
            is_own: false,
        };
        script.history.push(message.clone());

        if script.echo_sends
            && let Some(live) = &script.live
        {
            let _ = live.unbounded_send(Ok(StreamEvent::Message {
                data: message.clone(),
                timestamp: Some(message.created_at),
            }));
        }
        Ok(message)
    }

    async fn fetch_page(
        &self,
        _conversation: &ConversationId,
        request: &PageRequest,
    ) -> Result<Page, ScriptedError> {
        let (page, latency) = {
            let mut script = self.lock();
            script.calls.push(Call::FetchPage { limit: request.limit, before: request.before.clone() });
            if let Some(reason) = script.page_failures.pop_front() {
                return Err(ScriptedError(reason));
            }

            let end = match &request.before {
                Some(before) => {
                    script.history.iter().position(|message| &message.id == before).unwrap_or(0)
                },
                None => script.history.len(),
            };
            let start = end.saturating_sub(request.limit);
            let page = Page { messages: script.history[start..end].to_vec(), has_more: start > 0 };
            (page, script.page_latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(page)
    }

    async fn send_typing(
        &self,
        _conversation: &ConversationId,
        is_typing: bool,
    ) -> Result<(), ScriptedError> {
        self.lock().calls.push(Call::Typing(is_typing));
        Ok(())
    }
}
