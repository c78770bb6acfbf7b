//! Core state machines for Bright Ears booking conversations.
//!
//! Everything in this crate is Sans-IO: components take the current time as
//! input, keep their timers as deadlines, and never touch the network. The
//! runtime decides when to call them and executes what they ask for.
//!
//! # Components
//!
//! - [`timeline::Timeline`]: ordered, de-duplicated message list with cursor
//!   pagination
//! - [`reconnect::Reconnector`]: exponential-backoff reconnection
//! - [`quality::QualityMonitor`]: heartbeat-based connection quality
//! - [`typing::TypingCoordinator`]: debounced outbound typing signals
//! - [`typing::TypingIndicators`]: remote typing state with expiry
//! - [`sse::SseDecoder`]: incremental `text/event-stream` decoder
//! - [`event::StreamEvent`]: typed server-push events

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod event;
pub mod message;
pub mod quality;
pub mod reconnect;
pub mod sse;
pub mod timeline;
pub mod typing;

pub use env::{Environment, TimePoint};
pub use error::ChatError;
pub use event::{ConnectedData, DeliveryStatusData, StreamEvent, TypingData};
pub use message::{
    DeliveryStatus, Message, MessageDraft, MessageId, MessagePatch, MessageType, Page,
    SendMessageRequest, Sender, SenderRole, TypingRequest, Viewer,
};
pub use quality::{ConnectionQuality, QualityConfig, QualityMonitor};
pub use reconnect::{ReconnectDecision, ReconnectPolicy, Reconnector};
pub use sse::{SseDecoder, SseFrame};
pub use timeline::{PageOutcome, PageRequest, Timeline};
pub use typing::{TypingConfig, TypingCoordinator, TypingIndicators, TypingSignal, TypingUser};
