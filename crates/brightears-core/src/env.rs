//! Environment abstraction for deterministic testing.
//!
//! Decouples conversation logic from system resources (time, randomness).
//! Enables deterministic simulation with a virtual clock and seeded RNG, and
//! production use with real system resources.

use std::{
    fmt::Debug,
    ops::{Add, Sub},
    time::Duration,
};

use chrono::{DateTime, Utc};

/// Monotonic point in time used by every state machine in this crate.
///
/// Production uses `tokio::time::Instant` (or `std::time::Instant`), tests use
/// a virtual instant. Deadlines are computed with `+ Duration`, elapsed time
/// with `-`.
pub trait TimePoint:
    Copy + Ord + Send + Sync + Debug + Sub<Output = Duration> + Add<Duration, Output = Self>
{
    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    fn saturating_since(self, earlier: Self) -> Duration {
        if self > earlier { self - earlier } else { Duration::ZERO }
    }
}

impl<T> TimePoint for T where
    T: Copy + Ord + Send + Sync + Debug + Sub<Output = Duration> + Add<Duration, Output = T>
{
}

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    type Instant: TimePoint;

    /// Current time (monotonic).
    ///
    /// # Invariants
    ///
    /// - Subsequent calls must return times >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only runtime code awaits this; state machines take time as input.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same RNG seed, simulation environments produce the same
    /// sequence of bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Wall-clock time, used for timestamps shown to people.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Generates a random `u64`.
    ///
    /// Used for temporary message ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn saturating_since_never_underflows() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(5);

        assert_eq!(t1.saturating_since(t0), Duration::from_secs(5));
        assert_eq!(t0.saturating_since(t1), Duration::ZERO);
    }
}
