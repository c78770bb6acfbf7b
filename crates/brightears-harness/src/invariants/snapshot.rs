//! Observed state for invariant checking.
//!
//! Invariants run against an [`Observation`]: the snapshot taken after the
//! latest event plus the one before it, so transition properties (status
//! monotonicity) can be checked alongside state properties.

use brightears_client::ChatSnapshot;

/// Current snapshot and its predecessor.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Snapshot before the latest event. `None` for the first observation.
    pub previous: Option<ChatSnapshot>,
    /// Snapshot after the latest event.
    pub current: ChatSnapshot,
}

impl Observation {
    /// First observation of a conversation.
    pub fn first(current: ChatSnapshot) -> Self {
        Self { previous: None, current }
    }
}

/// Pairs each snapshot with the one before it.
#[derive(Debug, Default)]
pub struct Recorder {
    last: Option<ChatSnapshot>,
}

impl Recorder {
    /// Recorder with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` and return it paired with the previous snapshot.
    pub fn observe(&mut self, current: ChatSnapshot) -> Observation {
        let previous = self.last.replace(current.clone());
        Observation { previous, current }
    }
}

#[cfg(test)]
mod tests {
    use brightears_client::ConnectionStatus;

    use super::*;

    #[test]
    fn recorder_pairs_consecutive_snapshots() {
        let mut recorder = Recorder::new();
        let first = recorder.observe(ChatSnapshot::empty());
        assert!(first.previous.is_none());

        let connecting =
            ChatSnapshot { status: ConnectionStatus::Connecting, ..ChatSnapshot::empty() };
        let second = recorder.observe(connecting);
        assert_eq!(second.previous, Some(ChatSnapshot::empty()));
        assert_eq!(second.current.status, ConnectionStatus::Connecting);
    }
}
