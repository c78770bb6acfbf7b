//! Production Environment implementation using the tokio clock and OS RNG.
//!
//! `SystemEnv` uses `tokio::time::Instant` rather than `std::time::Instant` so
//! that the runtime honours paused time in tests: every deadline the client
//! computes lines up with the sleeps the runtime awaits.

use std::time::Duration;

use brightears_core::Environment;
use chrono::{DateTime, Utc};

/// Production environment using the tokio clock and OS randomness.
///
/// # Panics
///
/// Panics if the OS RNG fails. Temporary message ids are drawn from it and
/// RNG failure indicates OS-level issues.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }

    #[allow(clippy::disallowed_methods)]
    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_follows_paused_clock() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_secs(30)).await;

        assert!(env.now() - start >= Duration::from_secs(30));
    }

    #[test]
    fn random_ids_differ() {
        let env = SystemEnv::new();
        assert_ne!(env.random_u64(), env.random_u64());
    }
}
