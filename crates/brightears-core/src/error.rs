//! Error types for the conversation core.
//!
//! Strongly-typed errors for the state machines: invalid operations, message
//! bookkeeping, payload decoding, and the recoverable failures reported back
//! from the transport (stream, send, pagination).

use thiserror::Error;

use crate::message::MessageId;

/// Errors produced by conversation state machines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Operation not allowed in the current state.
    #[error("invalid state: cannot {operation} while {state}")]
    InvalidState {
        /// Human readable state at the time of the call.
        state: String,
        /// Operation that was attempted.
        operation: String,
    },

    /// Message has neither content nor an attachment.
    #[error("message is empty")]
    EmptyMessage,

    /// No message with this id is in the timeline.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// Message exists but is not in the FAILED state.
    #[error("message {0} has not failed and cannot be retried")]
    NotRetryable(MessageId),

    /// Stream payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Stream transport failed (closed, unreachable, stale).
    #[error("transport error: {0}")]
    Transport(String),

    /// Outbound message POST was rejected or never reached the server.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Page fetch failed.
    #[error("pagination failed: {0}")]
    Pagination(String),

    /// Automatic reconnection gave up.
    #[error("reconnect gave up after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl ChatError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Transport, send, and pagination failures are retryable by the caller.
    /// Validation failures and decode errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::SendFailed(_) | Self::Pagination(_))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
