//! Conversation sessions driven from the command line.

use std::{collections::HashSet, time::Duration};

use brightears_app::{ChatHandle, Runtime, RuntimeError, SystemEnv};
use brightears_client::{
    ChatConfig, ChatSnapshot, ConnectionStatus, ConversationId,
    http::{HttpConfig, HttpError, HttpTransport},
};
use brightears_core::{DeliveryStatus, MessageDraft, MessageId, SendMessageRequest, Viewer};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::report;

/// Errors surfaced to the user.
#[derive(Debug, Error)]
pub enum CliError {
    /// Transport could not be configured.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Runtime rejected a command or stopped.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The message was marked failed.
    #[error("message not sent: {0}")]
    SendFailed(String),

    /// Nothing happened in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Signal handling failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to join one conversation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server and credentials.
    pub http: HttpConfig,
    /// Booking to join.
    pub conversation: ConversationId,
    /// Who is speaking.
    pub viewer: Viewer,
    /// Client tuning.
    pub chat: ChatConfig,
}

struct Session {
    handle: ChatHandle,
    task: JoinHandle<Result<(), RuntimeError>>,
}

impl Session {
    fn start(config: SessionConfig) -> Result<Self, CliError> {
        let transport = HttpTransport::new(config.http)?;
        let (runtime, handle) =
            Runtime::new(SystemEnv::new(), transport, config.conversation, config.viewer, config.chat);
        Ok(Self { handle, task: tokio::spawn(runtime.run()) })
    }

    async fn wait_for(
        &mut self,
        what: &'static str,
        limit: Duration,
        predicate: impl FnMut(&ChatSnapshot) -> bool,
    ) -> Result<ChatSnapshot, CliError> {
        tokio::time::timeout(limit, self.handle.wait_for(predicate))
            .await
            .map_err(|_| CliError::Timeout(what))?
            .map_err(CliError::from)
    }

    async fn stop(self) -> Result<(), CliError> {
        self.handle.shutdown().await?;
        match self.task.await {
            Ok(result) => Ok(result?),
            Err(e) => {
                warn!(error = %e, "runtime task did not finish cleanly");
                Ok(())
            },
        }
    }
}

/// Follow a conversation until Ctrl-C, logging every change.
pub async fn watch(config: SessionConfig) -> Result<(), CliError> {
    let conversation = config.conversation.clone();
    let mut session = Session::start(config)?;
    let mut previous = ChatSnapshot::empty();
    info!(%conversation, "watching; press Ctrl-C to leave");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("leaving conversation");
                break;
            },
            snapshot = session.handle.changed() => {
                let snapshot = snapshot?;
                report::log_changes(&previous, &snapshot);
                previous = snapshot;
            },
        }
    }

    session.stop().await
}

/// Send one message and wait for the server to confirm it.
pub async fn send(
    config: SessionConfig,
    draft: MessageDraft,
    limit: Duration,
) -> Result<MessageId, CliError> {
    draft.validate().map_err(|e| CliError::SendFailed(e.to_string()))?;
    // The server stores the trimmed text, so match on what is actually sent.
    let content = SendMessageRequest::from(&draft).content;
    let mut session = Session::start(config)?;

    let before = session
        .wait_for("connection", limit, |s| s.status == ConnectionStatus::Connected)
        .await?;
    let known: HashSet<MessageId> = before.messages.into_iter().map(|m| m.id).collect();
    let temp_id = session.handle.send_message(draft).await?;

    let snapshot = session
        .wait_for("confirmation", limit, |s| {
            !s.messages.iter().any(|m| m.id == temp_id && m.status == DeliveryStatus::Sent)
        })
        .await?;

    let outcome = if snapshot.messages.iter().any(|m| m.id == temp_id) {
        Err(CliError::SendFailed(snapshot.last_error.unwrap_or_default()))
    } else {
        confirmed_id(&snapshot, &known, &content)
            .ok_or_else(|| CliError::SendFailed("message missing after confirmation".to_string()))
    };

    session.stop().await?;
    if let Ok(id) = &outcome {
        info!(%id, "message sent");
    }
    outcome
}

/// Server id of the own message that replaced an optimistic send.
fn confirmed_id(
    snapshot: &ChatSnapshot,
    known: &HashSet<MessageId>,
    content: &str,
) -> Option<MessageId> {
    snapshot
        .messages
        .iter()
        .rev()
        .find(|m| m.is_own && !m.id.is_temporary() && !known.contains(&m.id) && m.content == content)
        .map(|m| m.id.clone())
}
