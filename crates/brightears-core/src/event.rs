//! Typed server-push events.
//!
//! Every SSE `data:` payload is a JSON object with a `type` discriminator and
//! a type-specific `data` body. [`StreamEvent`] is the closed set of events a
//! conversation stream carries; decoding goes through [`StreamEvent::decode`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::ChatError,
    message::{DeliveryStatus, Message, MessageId},
};

/// Event pushed by the server on a conversation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stream accepted by the server.
    Connected {
        /// Presence information.
        data: ConnectedData,
        /// Server time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// New message in the conversation.
    Message {
        /// The message.
        data: Message,
        /// Server time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// A participant started or stopped typing.
    Typing {
        /// Typing signal.
        data: TypingData,
        /// Server time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// A message's delivery state changed.
    DeliveryStatus {
        /// Status update.
        data: DeliveryStatusData,
        /// Server time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// Keepalive heartbeat.
    Ping {
        /// Server time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
}

impl StreamEvent {
    /// Decode one JSON payload.
    ///
    /// # Errors
    ///
    /// - `ChatError::Decode` for malformed JSON or an unknown `type`
    pub fn decode(payload: &str) -> Result<Self, ChatError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Wire name of the event type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::DeliveryStatus { .. } => "delivery_status",
            Self::Ping { .. } => "ping",
        }
    }

    /// Server timestamp carried by the event, if any.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Connected { timestamp, .. }
            | Self::Message { timestamp, .. }
            | Self::Typing { timestamp, .. }
            | Self::DeliveryStatus { timestamp, .. }
            | Self::Ping { timestamp } => *timestamp,
        }
    }
}

/// Body of a `connected` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedData {
    /// Server-side identifier of this stream.
    pub connection_id: String,
    /// Number of viewers currently watching the conversation.
    #[serde(default)]
    pub active_users: u32,
}

/// Body of a `typing` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingData {
    /// User whose typing state changed.
    pub user_id: String,
    /// Display name of that user.
    #[serde(default)]
    pub user_name: String,
    /// Whether the user is typing.
    pub is_typing: bool,
}

/// Body of a `delivery_status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusData {
    /// Message whose state changed.
    pub message_id: MessageId,
    /// New state.
    pub status: DeliveryStatus,
    /// When the change happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}
