//! Circuit breaker.
//!
//! Stops calling a provider that keeps failing. Pure state machine: callers
//! pass the current time, and the open period is a stored deadline.
//!
//! # State Machine
//!
//! ```text
//!          failures == threshold
//! ┌────────┐ ─────────────────────> ┌──────┐
//! │ Closed │                        │ Open │
//! └────────┘ <──┐                   └──────┘
//!     ↑         │ success               │ reset_timeout elapsed
//!     │ reset   │                       ↓
//!     │         │                 ┌──────────┐
//!     └─────────┴──────────────── │ HalfOpen │── failure ──> Open
//!                                 └──────────┘
//! ```
//!
//! While half-open exactly one trial call is admitted. A trial abandoned
//! without a verdict (see [`CircuitBreaker::abandon`]) frees the slot for the
//! next caller.

use std::time::Duration;

use brightears_core::TimePoint;
use tracing::{debug, warn};

/// Default consecutive failures before the breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time the breaker stays open.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Breaker tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a trial call.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: DEFAULT_FAILURE_THRESHOLD, reset_timeout: DEFAULT_RESET_TIMEOUT }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected.
    Open,
    /// One trial call decides whether to close again.
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase<I> {
    Closed,
    Open { until: I },
    HalfOpen { trial_in_flight: bool },
}

/// Per-channel circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreaker<I> {
    config: BreakerConfig,
    failures: u32,
    phase: Phase<I>,
}

impl<I: TimePoint> CircuitBreaker<I> {
    /// Closed breaker.
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, failures: 0, phase: Phase::Closed }
    }

    /// Current state. An open breaker whose timeout has passed reports
    /// `Open` until the next [`CircuitBreaker::try_acquire`].
    pub fn state(&self) -> BreakerState {
        match self.phase {
            Phase::Closed => BreakerState::Closed,
            Phase::Open { .. } => BreakerState::Open,
            Phase::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// When an open breaker will admit a trial call.
    pub fn retry_at(&self) -> Option<I> {
        match self.phase {
            Phase::Open { until } => Some(until),
            _ => None,
        }
    }

    /// Ask to make a call.
    ///
    /// Returns `Err(retry_in)` while open, or while half-open with the trial
    /// call still outstanding (`retry_in` is zero then).
    pub fn try_acquire(&mut self, now: I) -> Result<(), Duration> {
        match self.phase {
            Phase::Closed => Ok(()),
            Phase::Open { until } if now >= until => {
                debug!("circuit half-open, admitting trial call");
                self.phase = Phase::HalfOpen { trial_in_flight: true };
                Ok(())
            },
            Phase::Open { until } => Err(until.saturating_since(now)),
            Phase::HalfOpen { trial_in_flight: false } => {
                self.phase = Phase::HalfOpen { trial_in_flight: true };
                Ok(())
            },
            Phase::HalfOpen { trial_in_flight: true } => Err(Duration::ZERO),
        }
    }

    /// The admitted call succeeded.
    pub fn record_success(&mut self) {
        if self.phase != Phase::Closed {
            debug!("circuit closed");
        }
        self.failures = 0;
        self.phase = Phase::Closed;
    }

    /// The admitted call failed.
    pub fn record_failure(&mut self, now: I) {
        self.failures = self.failures.saturating_add(1);

        let trip = match self.phase {
            Phase::HalfOpen { .. } => true,
            Phase::Closed => self.failures >= self.config.failure_threshold,
            Phase::Open { .. } => false,
        };
        if trip {
            warn!(failures = self.failures, "circuit opened");
            self.phase = Phase::Open { until: now + self.config.reset_timeout };
        }
    }

    /// The admitted call was dropped before it finished. A half-open
    /// breaker admits a new trial; otherwise nothing changes.
    pub fn abandon(&mut self) {
        if self.phase == (Phase::HalfOpen { trial_in_flight: true }) {
            debug!("trial call abandoned");
            self.phase = Phase::HalfOpen { trial_in_flight: false };
        }
    }

    /// Force the breaker closed and forget past failures.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.phase = Phase::Closed;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker<Instant> {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_secs(30),
        })
    }

    #[test]
    fn opens_after_threshold() {
        let t0 = Instant::now();
        let mut breaker = breaker(3);

        for _ in 0..2 {
            assert!(breaker.try_acquire(t0).is_ok());
            breaker.record_failure(t0);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure(t0);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.try_acquire(t0 + Duration::from_secs(10)), Err(Duration::from_secs(20)));
    }

    #[test]
    fn success_resets_failure_count() {
        let t0 = Instant::now();
        let mut breaker = breaker(2);

        breaker.record_failure(t0);
        breaker.record_success();
        breaker.record_failure(t0);

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.failures(), 1);
    }

    #[test]
    fn half_open_admits_one_trial() {
        let t0 = Instant::now();
        let mut breaker = breaker(1);
        breaker.record_failure(t0);

        let later = t0 + Duration::from_secs(30);
        assert!(breaker.try_acquire(later).is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!(breaker.try_acquire(later), Err(Duration::ZERO));

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn failed_trial_reopens() {
        let t0 = Instant::now();
        let mut breaker = breaker(1);
        breaker.record_failure(t0);

        let later = t0 + Duration::from_secs(31);
        assert!(breaker.try_acquire(later).is_ok());
        breaker.record_failure(later);

        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.retry_at(), Some(later + Duration::from_secs(30)));
    }

    #[test]
    fn abandoned_trial_admits_another() {
        let t0 = Instant::now();
        let mut breaker = breaker(1);
        breaker.record_failure(t0);

        let later = t0 + Duration::from_secs(30);
        assert!(breaker.try_acquire(later).is_ok());
        breaker.abandon();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        assert!(breaker.try_acquire(later).is_ok());
        assert_eq!(breaker.try_acquire(later), Err(Duration::ZERO));
    }

    #[test]
    fn abandon_while_closed_keeps_failures() {
        let t0 = Instant::now();
        let mut breaker = breaker(3);
        breaker.record_failure(t0);

        breaker.abandon();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.failures(), 1);
    }

    #[test]
    fn reset_closes() {
        let t0 = Instant::now();
        let mut breaker = breaker(1);
        breaker.record_failure(t0);

        breaker.reset();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire(t0).is_ok());
    }
}
