//! Deterministic simulation harness for Bright Ears conversation testing.
//!
//! Virtual-time implementations of the Environment and Transport traits for
//! deterministic, reproducible testing of reconnection, pagination, and
//! typing behavior.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the common
//! conversation invariants.
//!
//! # Scripted Server
//!
//! [`ScriptedTransport`] stands in for the booking API: tests seed history,
//! inject failures, and push stream events while a runtime drives it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod scripted_transport;
pub mod sim_env;

pub use invariants::{
    ConnectedResetsAttempts, Invariant, InvariantRegistry, InvariantResult, Observation,
    OptimisticMessagesPending, ReconnectBound, Recorder, StatusMonotonicity, TypingExcludesViewer,
    UniqueMessageIds, Violation,
};
pub use scripted_transport::{Call, ScriptedError, ScriptedTransport};
pub use sim_env::{SimEnv, SimInstant};
