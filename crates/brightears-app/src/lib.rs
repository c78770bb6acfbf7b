//! Application runtime for Bright Ears conversations
//!
//! Runs a [`brightears_client::ChatClient`] on a single tokio task, executing
//! its actions against a [`brightears_client::Transport`] and publishing
//! immutable snapshots for the UI. The same loop runs in production with
//! [`SystemEnv`] and in tests under paused tokio time.
//!
//! # Components
//!
//! - [`Runtime`]: Event loop over commands, stream, outbound calls, deadlines
//! - [`ChatHandle`]: Cloneable UI handle (commands in, snapshots out)
//! - [`SystemEnv`]: Production environment (tokio clock, OS RNG)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod handle;
mod runtime;
mod system_env;

pub use error::RuntimeError;
pub use handle::ChatHandle;
pub use runtime::Runtime;
pub use system_env::SystemEnv;
