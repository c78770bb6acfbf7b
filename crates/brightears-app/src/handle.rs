//! UI-facing handle to a running conversation.

use brightears_client::ChatSnapshot;
use brightears_core::{ChatError, MessageDraft, MessageId};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::RuntimeError;

/// Request from the UI to the runtime.
#[derive(Debug)]
pub(crate) enum Request {
    SendMessage(MessageDraft),
    RetryMessage(MessageId),
    LoadMore,
    InputChanged(String),
    InputBlurred,
    Disconnect,
    Reconnect,
    SetEnabled(bool),
    Shutdown,
}

/// Request plus the channel its outcome is reported on. A request that
/// posts a message reports the message's temporary id.
#[derive(Debug)]
pub(crate) struct Command {
    pub(crate) request: Request,
    pub(crate) reply: oneshot::Sender<Result<Option<MessageId>, ChatError>>,
}

/// Cheap, cloneable handle to a conversation runtime.
///
/// State flows out through a `watch` channel of [`ChatSnapshot`]s; intents
/// flow in as commands. Each command resolves once the runtime has applied
/// it, with the client's verdict.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<ChatSnapshot>,
}

impl ChatHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshots: watch::Receiver<ChatSnapshot>,
    ) -> Self {
        Self { commands, snapshots }
    }

    /// Latest published state.
    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Independent receiver for rendering loops.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshots.clone()
    }

    /// Wait for the next published state.
    pub async fn changed(&mut self) -> Result<ChatSnapshot, RuntimeError> {
        self.snapshots.changed().await.map_err(|_| RuntimeError::Closed)?;
        Ok(self.snapshots.borrow_and_update().clone())
    }

    /// Wait until `predicate` holds for the published state.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&ChatSnapshot) -> bool,
    ) -> Result<ChatSnapshot, RuntimeError> {
        let snapshot =
            self.snapshots.wait_for(predicate).await.map_err(|_| RuntimeError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Send a message optimistically.
    ///
    /// Returns the temporary id the message is shown under until the server
    /// confirms it or the send fails.
    pub async fn send_message(&self, draft: MessageDraft) -> Result<MessageId, RuntimeError> {
        self.request(Request::SendMessage(draft)).await?.ok_or_else(|| {
            RuntimeError::Chat(ChatError::InvalidState {
                state: "send accepted without a post".to_string(),
                operation: "send_message".to_string(),
            })
        })
    }

    /// Re-post a failed message.
    pub async fn retry_message(&self, id: MessageId) -> Result<(), RuntimeError> {
        self.command(Request::RetryMessage(id)).await
    }

    /// Load the page before the oldest loaded message. A no-op while a page
    /// is loading or when nothing older exists.
    pub async fn load_more(&self) -> Result<(), RuntimeError> {
        self.command(Request::LoadMore).await
    }

    /// Composer text changed.
    pub async fn input_changed(&self, text: impl Into<String>) -> Result<(), RuntimeError> {
        self.command(Request::InputChanged(text.into())).await
    }

    /// Composer lost focus.
    pub async fn input_blurred(&self) -> Result<(), RuntimeError> {
        self.command(Request::InputBlurred).await
    }

    /// Close the stream without reconnecting.
    pub async fn disconnect(&self) -> Result<(), RuntimeError> {
        self.command(Request::Disconnect).await
    }

    /// Reconnect now, resetting the attempt counter.
    pub async fn reconnect(&self) -> Result<(), RuntimeError> {
        self.command(Request::Reconnect).await
    }

    /// Enable or disable the conversation.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), RuntimeError> {
        self.command(Request::SetEnabled(enabled)).await
    }

    /// Stop the runtime. Later calls fail with [`RuntimeError::Closed`].
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.command(Request::Shutdown).await
    }

    async fn command(&self, request: Request) -> Result<(), RuntimeError> {
        self.request(request).await.map(|_| ())
    }

    async fn request(&self, request: Request) -> Result<Option<MessageId>, RuntimeError> {
        let (reply, outcome) = oneshot::channel();
        self.commands.send(Command { request, reply }).await.map_err(|_| RuntimeError::Closed)?;
        Ok(outcome.await.map_err(|_| RuntimeError::Closed)??)
    }
}
