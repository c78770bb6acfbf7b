//! Notification errors.

use std::time::Duration;

use thiserror::Error;

use crate::provider::{Channel, ProviderError};

/// Errors returned by [`Notifier::send`](crate::Notifier::send).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The channel's breaker is open; the provider was not called.
    #[error("{channel} circuit open, retry in {retry_in:?}")]
    CircuitOpen {
        /// Affected channel.
        channel: Channel,
        /// Time until a trial call is admitted.
        retry_in: Duration,
    },

    /// No provider is registered for the channel.
    #[error("no provider for {0}")]
    NoProvider(Channel),

    /// Provider rejected the notification permanently.
    #[error("{channel} provider failed: {source}")]
    Provider {
        /// Affected channel.
        channel: Channel,
        /// Provider failure.
        source: ProviderError,
    },

    /// Every attempt failed.
    #[error("{channel} delivery failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Affected channel.
        channel: Channel,
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        last: ProviderError,
    },
}
