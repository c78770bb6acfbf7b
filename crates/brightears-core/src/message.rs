//! Conversation message model.
//!
//! Messages are created either optimistically by the local client (temporary
//! id, [`DeliveryStatus::Sent`]) or authoritatively by the server. JSON field
//! names follow the server's camelCase wire format.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Prefix marking a locally generated id awaiting server confirmation.
const TEMP_ID_PREFIX: &str = "temp-";

/// Message identity.
///
/// Either a server-assigned id or a temporary id of the form
/// `temp-<16 hex digits>` generated when a message is sent optimistically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a server-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Temporary id derived from a random value.
    pub fn temporary(nonce: u64) -> Self {
        Self(format!("{TEMP_ID_PREFIX}{nonce:016x}"))
    }

    /// True if this id was generated locally and is not yet confirmed.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of message content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Plain text.
    #[default]
    Text,
    /// Image attachment with optional caption.
    Image,
    /// File attachment with optional caption.
    File,
    /// Generated by the platform (booking updates, quotes).
    System,
}

/// Delivery state of a message.
///
/// Advances `Sent -> Delivered -> Read` and never regresses. `Failed` is only
/// reachable from `Sent` and only left through an explicit retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Accepted locally or by the server, not yet delivered.
    #[default]
    Sent,
    /// Delivered to the recipient's device.
    Delivered,
    /// Seen by the recipient.
    Read,
    /// Send failed; awaiting manual retry.
    Failed,
}

impl DeliveryStatus {
    /// Position on the forward path. `Failed` sits outside it.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Sent => Some(0),
            Self::Delivered => Some(1),
            Self::Read => Some(2),
            Self::Failed => None,
        }
    }

    /// State after observing `next`, or `None` if the transition is not
    /// allowed (a regression, a repeat, or anything out of `Failed`).
    pub fn advance(self, next: Self) -> Option<Self> {
        match (self, next) {
            (Self::Sent, Self::Failed) => Some(Self::Failed),
            (Self::Failed, _) | (_, Self::Failed) => None,
            (current, next) => (next.rank() > current.rank()).then_some(next),
        }
    }
}

/// Role of a conversation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderRole {
    /// Customer booking an artist.
    Customer,
    /// Performing artist.
    Artist,
    /// Platform staff.
    Admin,
}

/// Identity of a message author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    /// Stable user id from the identity provider.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Participant role.
    pub role: SenderRole,
    /// Avatar image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// The person viewing the conversation, supplied by the identity provider.
pub type Viewer = Sender;

/// A conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server id, or a temporary id while unconfirmed.
    pub id: MessageId,
    /// Text content (caption for attachments).
    pub content: String,
    /// Content kind.
    #[serde(default)]
    pub message_type: MessageType,
    /// Attachment location for image/file messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Delivery state.
    #[serde(default)]
    pub status: DeliveryStatus,
    /// When the message reached the recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the recipient read the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    /// Message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<MessageId>,
    /// Author.
    pub sender: Sender,
    /// True if the viewer wrote this message.
    #[serde(default)]
    pub is_own: bool,
}

impl Message {
    /// Build the local copy of a message before the server has seen it.
    pub fn optimistic(
        id: MessageId,
        draft: &MessageDraft,
        viewer: &Viewer,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            content: draft.content.clone(),
            message_type: draft.message_type,
            attachment_url: draft.attachment_url.clone(),
            created_at,
            status: DeliveryStatus::Sent,
            delivered_at: None,
            read_at: None,
            parent_message_id: draft.parent_message_id.clone(),
            sender: viewer.clone(),
            is_own: true,
        }
    }

    /// Advance the delivery state, stamping `delivered_at`/`read_at`.
    ///
    /// Returns `true` if the status changed.
    pub fn apply_status(&mut self, status: DeliveryStatus, at: Option<DateTime<Utc>>) -> bool {
        let Some(next) = self.status.advance(status) else {
            return false;
        };

        self.status = next;
        match next {
            DeliveryStatus::Delivered => {
                self.delivered_at = self.delivered_at.or(at);
            },
            DeliveryStatus::Read => {
                self.delivered_at = self.delivered_at.or(at);
                self.read_at = self.read_at.or(at);
            },
            DeliveryStatus::Sent | DeliveryStatus::Failed => {},
        }
        true
    }

    /// Apply a partial update. Status changes still only move forward.
    pub fn apply_patch(&mut self, patch: MessagePatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(url) = patch.attachment_url {
            self.attachment_url = Some(url);
        }
        if let Some(status) = patch.status {
            self.apply_status(status, patch.status_at);
        }
    }
}

/// Partial update for an existing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    /// Replacement content.
    pub content: Option<String>,
    /// Replacement attachment.
    pub attachment_url: Option<String>,
    /// Delivery state to advance to.
    pub status: Option<DeliveryStatus>,
    /// Timestamp for the status change.
    pub status_at: Option<DateTime<Utc>>,
}

impl MessagePatch {
    /// Patch that only advances the delivery state.
    pub fn status(status: DeliveryStatus, at: Option<DateTime<Utc>>) -> Self {
        Self { status: Some(status), status_at: at, ..Self::default() }
    }
}

/// Message composed by the viewer, before it has an id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDraft {
    /// Text content.
    pub content: String,
    /// Content kind.
    pub message_type: MessageType,
    /// Uploaded attachment location.
    pub attachment_url: Option<String>,
    /// Message being replied to.
    pub parent_message_id: Option<MessageId>,
}

impl MessageDraft {
    /// Plain text draft.
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Self::default() }
    }

    /// Attach an uploaded file or image.
    #[must_use]
    pub fn with_attachment(mut self, message_type: MessageType, url: impl Into<String>) -> Self {
        self.message_type = message_type;
        self.attachment_url = Some(url.into());
        self
    }

    /// Mark the draft as a reply.
    #[must_use]
    pub fn replying_to(mut self, parent: MessageId) -> Self {
        self.parent_message_id = Some(parent);
        self
    }

    /// Reject drafts with neither text nor an attachment.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.content.trim().is_empty() && self.attachment_url.is_none() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(())
    }
}

/// Body of the send-message POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Text content, trimmed.
    pub content: String,
    /// Content kind.
    pub message_type: MessageType,
    /// Attachment location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    /// Replied-to message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<MessageId>,
}

impl From<&MessageDraft> for SendMessageRequest {
    fn from(draft: &MessageDraft) -> Self {
        Self {
            content: draft.content.trim().to_string(),
            message_type: draft.message_type,
            attachment_url: draft.attachment_url.clone(),
            parent_message_id: draft.parent_message_id.clone(),
        }
    }
}

impl From<&Message> for SendMessageRequest {
    fn from(message: &Message) -> Self {
        Self {
            content: message.content.trim().to_string(),
            message_type: message.message_type,
            attachment_url: message.attachment_url.clone(),
            parent_message_id: message.parent_message_id.clone(),
        }
    }
}

/// Body of the typing-signal POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    /// Whether the viewer is typing.
    pub is_typing: bool,
}

/// One page of message history, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Messages in chronological order.
    pub messages: Vec<Message>,
    /// Whether older messages exist beyond this page.
    #[serde(default)]
    pub has_more: bool,
}
