//! Provider boundary for outbound notifications.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Email provider.
    Email,
    /// SMS gateway.
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => f.write_str("email"),
            Self::Sms => f.write_str("sms"),
        }
    }
}

/// Rendered notification ready for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel to deliver on.
    pub channel: Channel,
    /// Email address or phone number.
    pub recipient: String,
    /// Subject line (email only).
    pub subject: Option<String>,
    /// Rendered body.
    pub body: String,
}

impl Notification {
    /// Email notification.
    pub fn email(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            channel: Channel::Email,
            recipient: recipient.into(),
            subject: Some(subject.into()),
            body: body.into(),
        }
    }

    /// SMS notification.
    pub fn sms(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self { channel: Channel::Sms, recipient: recipient.into(), subject: None, body: body.into() }
    }
}

/// Provider acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Provider-side message id.
    pub provider_id: String,
}

/// Provider failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider's description of the failure.
    pub message: String,
    /// Whether retrying may succeed (timeouts, 5xx, throttling).
    pub transient: bool,
}

impl ProviderError {
    /// Failure worth retrying.
    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), transient: true }
    }

    /// Failure that retrying cannot fix (bad recipient, rejected content).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), transient: false }
    }
}

/// An email or SMS provider.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Deliver one notification.
    async fn deliver(&self, notification: &Notification) -> Result<Receipt, ProviderError>;
}
