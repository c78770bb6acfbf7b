//! Reconnection controller.
//!
//! Retries a failed stream with exponential backoff, bounded by a maximum
//! attempt count. Pure state machine: failures and polls take the current
//! time, and the only timer is a stored deadline.
//!
//! # State Machine
//!
//! ```text
//!            failure (attempts < max)
//! ┌──────┐ ─────────────────────────> ┌─────────┐
//! │ Idle │                            │ Waiting │──poll(due)──> caller reopens
//! └──────┘ <── connected / manual ─── └─────────┘
//!    │                                     │ failure (attempts == max)
//!    │ cancel                              ↓
//!    ↓                               ┌───────────┐
//! ┌───────────┐                      │ Exhausted │── manual ──> Idle
//! │ Cancelled │── manual ──> Idle    └───────────┘
//! └───────────┘
//! ```

use std::time::Duration;

use crate::env::TimePoint;

/// Delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on any single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Automatic retries before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay for attempt 0; doubles per attempt.
    pub base_delay: Duration,
    /// Cap on the delay.
    pub max_delay: Duration,
    /// Automatic retries allowed before a manual reconnect is required.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-indexed):
    /// `min(base * 2^attempt, max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.checked_mul(factor).map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Outcome of reporting a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision<I> {
    /// A retry is scheduled.
    RetryAt {
        /// When the retry becomes due.
        deadline: I,
        /// Delay that was applied.
        delay: Duration,
        /// 1-based number of this retry.
        attempt: u32,
    },
    /// Attempts are exhausted; a manual reconnect is required.
    GiveUp {
        /// Attempts made.
        attempts: u32,
    },
    /// Reconnection was cancelled by the caller; nothing scheduled.
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase<I> {
    Idle,
    Waiting { deadline: I },
    Exhausted,
    Cancelled,
}

/// Exponential-backoff reconnection controller.
#[derive(Debug, Clone)]
pub struct Reconnector<I> {
    policy: ReconnectPolicy,
    attempts: u32,
    phase: Phase<I>,
}

impl<I: TimePoint> Reconnector<I> {
    /// Create an idle controller.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0, phase: Phase::Idle }
    }

    /// Backoff configuration.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Retries scheduled since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pending retry deadline.
    pub fn deadline(&self) -> Option<I> {
        match self.phase {
            Phase::Waiting { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// True once automatic retries are exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.phase == Phase::Exhausted
    }

    /// True after [`Reconnector::cancel`] until the next manual reconnect.
    pub fn is_cancelled(&self) -> bool {
        self.phase == Phase::Cancelled
    }

    /// Record a stream failure and decide what happens next.
    pub fn on_failure(&mut self, now: I) -> ReconnectDecision<I> {
        match self.phase {
            Phase::Cancelled => return ReconnectDecision::Suppressed,
            Phase::Waiting { deadline } => {
                // Already scheduled; a second failure report does not stack.
                return ReconnectDecision::RetryAt {
                    deadline,
                    delay: deadline.saturating_since(now),
                    attempt: self.attempts,
                };
            },
            Phase::Idle | Phase::Exhausted => {},
        }

        if self.attempts >= self.policy.max_attempts {
            self.phase = Phase::Exhausted;
            return ReconnectDecision::GiveUp { attempts: self.attempts };
        }

        let delay = self.policy.backoff_delay(self.attempts);
        let deadline = now + delay;
        self.attempts += 1;
        self.phase = Phase::Waiting { deadline };

        ReconnectDecision::RetryAt { deadline, delay, attempt: self.attempts }
    }

    /// True exactly once when the scheduled retry is due.
    pub fn poll(&mut self, now: I) -> bool {
        match self.phase {
            Phase::Waiting { deadline } if now >= deadline => {
                self.phase = Phase::Idle;
                true
            },
            _ => false,
        }
    }

    /// Successful open: reset everything.
    pub fn on_connected(&mut self) {
        self.attempts = 0;
        self.phase = Phase::Idle;
    }

    /// Manual reconnect: reset the counter and clear exhaustion or
    /// cancellation. The caller opens immediately, bypassing backoff.
    pub fn manual(&mut self) {
        self.attempts = 0;
        self.phase = Phase::Idle;
    }

    /// Caller-requested disconnect: drop the pending retry and refuse to
    /// schedule new ones.
    pub fn cancel(&mut self) {
        self.phase = Phase::Cancelled;
    }
}
