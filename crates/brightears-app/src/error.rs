//! Runtime errors.

use brightears_core::ChatError;
use thiserror::Error;

/// Errors surfaced through a [`crate::ChatHandle`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime has stopped; the conversation is shut down.
    #[error("conversation runtime is closed")]
    Closed,

    /// The client rejected the request.
    #[error(transparent)]
    Chat(#[from] ChatError),
}
