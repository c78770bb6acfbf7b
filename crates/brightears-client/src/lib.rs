//! Client
//!
//! Action-based conversation client for Bright Ears booking chat. Owns the
//! state of one conversation and orchestrates the core state machines
//! (reconnect, quality, typing, timeline) around a single event stream.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and Action-Based patterns as
//! [`brightears_core`]. It receives events ([`ChatEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ChatAction`]) for
//! the caller to execute against a [`Transport`].
//!
//! # Components
//!
//! - [`ChatClient`]: Top-level state machine for one conversation
//! - [`ChatEvent`]: Events fed into the client
//! - [`ChatAction`]: Actions produced by the client
//! - [`ChatSnapshot`]: Immutable view model for rendering
//! - [`Transport`]: Network boundary the runtime executes actions against
//!
//! # HTTP transport (optional)
//!
//! With the `http` feature enabled, this crate also provides
//! [`http::HttpTransport`], an SSE + JSON implementation of [`Transport`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod event;
mod state;
pub mod transport;

#[cfg(feature = "http")]
pub mod http;

pub use brightears_core::{Environment, Viewer};
pub use client::ChatClient;
pub use event::{ChatAction, ChatEvent};
pub use state::{ChatConfig, ChatSnapshot, ConnectionStatus, ConversationId};
pub use transport::{EventStream, Transport};
