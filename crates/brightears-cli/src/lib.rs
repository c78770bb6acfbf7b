//! Command line client for Bright Ears booking conversations.
//!
//! Joins one conversation over HTTP/SSE and reports what happens through
//! `tracing`. The binary in `main.rs` wires arguments to [`session`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod report;
pub mod session;

pub use session::{CliError, SessionConfig};
