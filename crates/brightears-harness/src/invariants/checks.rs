//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::{HashMap, HashSet};

use brightears_client::ConnectionStatus;
use brightears_core::DeliveryStatus;

use super::{Invariant, InvariantResult, Observation, Violation};

/// Every message id appears at most once in the timeline.
///
/// Duplicates mean a stream echo, a page overlap, or a confirmation was
/// appended instead of merged.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "UniqueMessageIds"
    }

    fn check(&self, state: &Observation) -> InvariantResult {
        let mut seen = HashSet::new();
        for message in &state.current.messages {
            if !seen.insert(&message.id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("message {} appears more than once", message.id),
                });
            }
        }
        Ok(())
    }
}

/// Position of a status in the forward order. `Failed` ranks with `Sent`:
/// a send may fail and a retry returns it to `Sent`.
fn rank(status: DeliveryStatus) -> u8 {
    match status {
        DeliveryStatus::Sent | DeliveryStatus::Failed => 0,
        DeliveryStatus::Delivered => 1,
        DeliveryStatus::Read => 2,
    }
}

/// Delivery status never moves backwards for a message that stays in the
/// timeline.
pub struct StatusMonotonicity;

impl Invariant for StatusMonotonicity {
    fn name(&self) -> &'static str {
        "StatusMonotonicity"
    }

    fn check(&self, state: &Observation) -> InvariantResult {
        let Some(previous) = &state.previous else {
            return Ok(());
        };

        let before: HashMap<_, _> =
            previous.messages.iter().map(|message| (&message.id, message.status)).collect();

        for message in &state.current.messages {
            if let Some(&old) = before.get(&message.id)
                && rank(message.status) < rank(old)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "message {}: status went {:?} → {:?}",
                        message.id, old, message.status
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Messages with temporary ids are the viewer's own and unconfirmed.
///
/// The server never learns temporary ids, so such a message can only be
/// `Sent` or `Failed`.
pub struct OptimisticMessagesPending;

impl Invariant for OptimisticMessagesPending {
    fn name(&self) -> &'static str {
        "OptimisticMessagesPending"
    }

    fn check(&self, state: &Observation) -> InvariantResult {
        for message in state.current.messages.iter().filter(|m| m.id.is_temporary()) {
            if !message.is_own || rank(message.status) != 0 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "temporary message {} has is_own={} status={:?}",
                        message.id, message.is_own, message.status
                    ),
                });
            }
        }
        Ok(())
    }
}

/// An open stream always has a zero retry count.
pub struct ConnectedResetsAttempts;

impl Invariant for ConnectedResetsAttempts {
    fn name(&self) -> &'static str {
        "ConnectedResetsAttempts"
    }

    fn check(&self, state: &Observation) -> InvariantResult {
        let current = &state.current;
        if current.status == ConnectionStatus::Connected && current.reconnect_attempts != 0 {
            return Err(Violation {
                invariant: self.name(),
                message: format!("connected with {} pending attempts", current.reconnect_attempts),
            });
        }
        Ok(())
    }
}

/// Automatic retries never exceed the policy maximum.
pub struct ReconnectBound {
    /// Maximum automatic attempts.
    pub max_attempts: u32,
}

impl Invariant for ReconnectBound {
    fn name(&self) -> &'static str {
        "ReconnectBound"
    }

    fn check(&self, state: &Observation) -> InvariantResult {
        let attempts = state.current.reconnect_attempts;
        if attempts > self.max_attempts {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{attempts} attempts exceed maximum {}", self.max_attempts),
            });
        }
        if state.current.needs_manual_reconnect && attempts != self.max_attempts {
            return Err(Violation {
                invariant: self.name(),
                message: format!("gave up after {attempts} of {} attempts", self.max_attempts),
            });
        }
        Ok(())
    }
}

/// The viewer never appears in their own typing indicator.
pub struct TypingExcludesViewer {
    /// Viewer's user id.
    pub viewer_id: String,
}

impl Invariant for TypingExcludesViewer {
    fn name(&self) -> &'static str {
        "TypingExcludesViewer"
    }

    fn check(&self, state: &Observation) -> InvariantResult {
        if state.current.typing_users.iter().any(|user| user.user_id == self.viewer_id) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("viewer {} listed as typing", self.viewer_id),
            });
        }
        Ok(())
    }
}
