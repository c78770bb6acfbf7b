//! Turns consecutive snapshots into log lines.

use brightears_client::{ChatSnapshot, ConnectionStatus};
use brightears_core::{ConnectionQuality, DeliveryStatus, Message, MessageId};
use tracing::{info, warn};

/// Something worth reporting between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<'a> {
    /// Stream status changed.
    Status(ConnectionStatus),
    /// Heartbeat quality changed.
    Quality(ConnectionQuality),
    /// A message appeared (live, paged, or optimistic).
    Message(&'a Message),
    /// A known message changed delivery state or id.
    Delivery {
        /// Message id after the change.
        id: &'a MessageId,
        /// New state.
        status: DeliveryStatus,
    },
    /// The set of remote typists changed.
    Typing(Vec<&'a str>),
    /// A new connection or send error.
    Error(&'a str),
    /// Automatic reconnection gave up.
    ManualReconnectRequired,
}

/// Differences from `previous` to `current`, in display order.
pub fn changes<'a>(previous: &ChatSnapshot, current: &'a ChatSnapshot) -> Vec<Change<'a>> {
    let mut out = Vec::new();

    if current.status != previous.status {
        out.push(Change::Status(current.status));
    }
    if current.quality != previous.quality {
        out.push(Change::Quality(current.quality));
    }

    for message in &current.messages {
        match previous.messages.iter().find(|old| old.id == message.id) {
            Some(old) if old.status != message.status => {
                out.push(Change::Delivery { id: &message.id, status: message.status });
            },
            Some(_) => {},
            None => {
                // A confirmed send keeps its slot but takes the server id.
                let confirmed = previous.messages.iter().any(|old| {
                    old.id.is_temporary() && old.is_own && old.content == message.content
                }) && message.is_own;
                if confirmed {
                    out.push(Change::Delivery { id: &message.id, status: message.status });
                } else {
                    out.push(Change::Message(message));
                }
            },
        }
    }

    if current.typing_users != previous.typing_users {
        out.push(Change::Typing(
            current.typing_users.iter().map(|user| user.user_name.as_str()).collect(),
        ));
    }
    if let Some(error) = current.last_error.as_deref()
        && previous.last_error.as_deref() != Some(error)
    {
        out.push(Change::Error(error));
    }
    if current.needs_manual_reconnect && !previous.needs_manual_reconnect {
        out.push(Change::ManualReconnectRequired);
    }
    out
}

/// Log every change between two snapshots.
pub fn log_changes(previous: &ChatSnapshot, current: &ChatSnapshot) {
    for change in changes(previous, current) {
        match change {
            Change::Status(status) => info!(%status, "connection"),
            Change::Quality(quality) => info!(?quality, "quality"),
            Change::Message(message) => info!(
                id = %message.id,
                from = %message.sender.name,
                at = %message.created_at,
                "{}",
                message.content
            ),
            Change::Delivery { id, status } => info!(%id, ?status, "delivery"),
            Change::Typing(names) if names.is_empty() => info!("nobody typing"),
            Change::Typing(names) => info!("{} typing", names.join(", ")),
            Change::Error(error) => warn!(%error, "conversation error"),
            Change::ManualReconnectRequired => {
                warn!("reconnect attempts exhausted; restart to try again");
            },
        }
    }
}
