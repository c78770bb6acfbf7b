//! Observable conversation state.
//!
//! [`ChatSnapshot`] is the view model handed to the UI: an immutable copy of
//! everything needed to render one booking conversation, taken at a point in
//! time.

use std::fmt;

use brightears_core::{
    ConnectionQuality, Message, QualityConfig, ReconnectPolicy, TypingConfig, TypingUser,
    timeline::DEFAULT_PAGE_SIZE,
};

/// Booking whose conversation is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap a booking id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Booking id as sent in URLs.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Stream connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Open requested, not yet confirmed.
    Connecting,
    /// Stream open.
    Connected,
    /// Closed on purpose (disabled, disconnected, shut down, or stale).
    Disconnected,
    /// Closed by a failure.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Reconnect automatically after stream failures.
    pub auto_reconnect: bool,
    /// Backoff policy for automatic reconnects.
    pub reconnect: ReconnectPolicy,
    /// Heartbeat check settings.
    pub quality: QualityConfig,
    /// Typing debounce and auto-stop.
    pub typing: TypingConfig,
    /// Messages per history page.
    pub page_size: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
            quality: QualityConfig::default(),
            typing: TypingConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Point-in-time copy of a conversation for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSnapshot {
    /// Stream status.
    pub status: ConnectionStatus,
    /// Heartbeat-derived health.
    pub quality: ConnectionQuality,
    /// Participants currently connected, as reported by the server.
    pub active_users: u32,
    /// Server-assigned id of the current stream.
    pub connection_id: Option<String>,
    /// Automatic retries since the last successful open.
    pub reconnect_attempts: u32,
    /// Automatic retries are exhausted; show a reconnect button.
    pub needs_manual_reconnect: bool,
    /// Timeline, oldest first.
    pub messages: Vec<Message>,
    /// Remote users currently typing.
    pub typing_users: Vec<TypingUser>,
    /// Older history exists.
    pub has_more: bool,
    /// A page request is outstanding.
    pub is_loading: bool,
    /// Last connection or send error.
    pub last_error: Option<String>,
    /// Last page error, cleared by the next successful page.
    pub page_error: Option<String>,
}

impl ChatSnapshot {
    /// Snapshot of a conversation that has not started.
    pub fn empty() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            quality: ConnectionQuality::Disconnected,
            active_users: 0,
            connection_id: None,
            reconnect_attempts: 0,
            needs_manual_reconnect: false,
            messages: Vec::new(),
            typing_users: Vec::new(),
            has_more: false,
            is_loading: false,
            last_error: None,
            page_error: None,
        }
    }
}

impl Default for ChatSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
