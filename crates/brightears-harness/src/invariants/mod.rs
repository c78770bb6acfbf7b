//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold during a conversation.
//! Unlike example-based tests that check specific scenarios, invariants
//! verify behavioral properties across all possible event orderings.
//!
//! # Architecture
//!
//! Tests record a [`ChatSnapshot`](brightears_client::ChatSnapshot) after
//! every event into an [`Observation`] (current state plus the one before it)
//! and run registered [`Invariant`] checks against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let mut recorder = Recorder::new();
//! let observation = recorder.observe(client.snapshot(env.now()));
//! registry.assert_all(&observation, "after tick");
//! ```

mod checks;
mod snapshot;

pub use checks::{
    ConnectedResetsAttempts, OptimisticMessagesPending, ReconnectBound, StatusMonotonicity,
    TypingExcludesViewer, UniqueMessageIds,
};
pub use snapshot::{Observation, Recorder};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against observed state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &Observation) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the invariants that need no configuration.
    ///
    /// Includes:
    /// - [`UniqueMessageIds`]: no id appears twice in the timeline
    /// - [`StatusMonotonicity`]: delivery status never moves backwards
    /// - [`OptimisticMessagesPending`]: temporary messages are own and unconfirmed
    /// - [`ConnectedResetsAttempts`]: an open stream has a zero retry count
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(UniqueMessageIds);
        registry.add(StatusMonotonicity);
        registry.add(OptimisticMessagesPending);
        registry.add(ConnectedResetsAttempts);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Builder form of [`InvariantRegistry::add`].
    #[must_use]
    pub fn with<I: Invariant + 'static>(mut self, invariant: I) -> Self {
        self.add(invariant);
        self
    }

    /// Check all invariants.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &Observation) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &Observation, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use brightears_client::ChatSnapshot;

    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn empty_conversation_passes() {
        let registry = InvariantRegistry::standard()
            .with(ReconnectBound { max_attempts: 5 })
            .with(TypingExcludesViewer { viewer_id: "cust-1".to_string() });

        let observation = Recorder::new().observe(ChatSnapshot::empty());
        assert!(registry.check_all(&observation).is_ok());
    }
}
