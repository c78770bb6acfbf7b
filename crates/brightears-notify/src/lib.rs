//! Notification delivery for Bright Ears.
//!
//! Booking events fan out to email and SMS providers. Providers are flaky, so
//! every channel sits behind a [`CircuitBreaker`] and every send is retried
//! with exponential backoff according to a [`RetryPolicy`].
//!
//! Breaker state lives in a [`Notifier`] constructed at start-up; nothing is
//! global. Time comes from an injected
//! [`Environment`](brightears_core::Environment), so backoff and breaker
//! timeouts are deterministic under test.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod breaker;
pub mod error;
pub mod notifier;
pub mod provider;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use error::NotifyError;
pub use notifier::Notifier;
pub use provider::{Channel, Notification, NotificationProvider, ProviderError, Receipt};
pub use retry::RetryPolicy;
