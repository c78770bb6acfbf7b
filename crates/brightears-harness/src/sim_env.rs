//! Simulated environment with a virtual clock and seeded RNG.
//!
//! Time only moves when a test advances it (or when code sleeps), so every
//! deadline fires at exactly the instant the state machines computed. Given
//! the same seed, temporary message ids are identical across runs.
//!
//! `sleep` advances the clock when called, not when awaited. Drive Sans-IO
//! state machines with it directly; the async runtime runs on tokio paused
//! time instead.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use brightears_core::Environment;
use chrono::{DateTime, TimeDelta, Utc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall-clock time at virtual instant zero (2023-11-14T22:13:20Z).
const WALL_CLOCK_BASE_SECS: i64 = 1_700_000_000;

/// Virtual instant: time elapsed since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Instant at `elapsed` into the simulation.
    pub fn from_elapsed(elapsed: Duration) -> Self {
        Self(elapsed)
    }

    /// Time since the simulation started.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs))
    }
}

#[derive(Debug)]
struct SimState {
    now: SimInstant,
    rng: ChaCha8Rng,
}

/// Deterministic [`Environment`] for simulation tests.
///
/// Clones share the same clock and RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment at virtual time zero with a seeded RNG.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { now: SimInstant::default(), rng: ChaCha8Rng::seed_from_u64(seed) };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the clock forward and return the new instant.
    pub fn advance(&self, duration: Duration) -> SimInstant {
        let mut state = self.lock();
        state.now = state.now + duration;
        state.now
    }

    /// Move the clock to `instant` if it lies in the future.
    pub fn advance_to(&self, instant: SimInstant) -> SimInstant {
        let mut state = self.lock();
        state.now = state.now.max(instant);
        state.now
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.lock().now
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let base = DateTime::from_timestamp(WALL_CLOCK_BASE_SECS, 0).unwrap_or_default();
        let elapsed = TimeDelta::from_std(self.now().elapsed()).unwrap_or_else(|_| TimeDelta::zero());
        base.checked_add_signed(elapsed).unwrap_or(base)
    }
}
