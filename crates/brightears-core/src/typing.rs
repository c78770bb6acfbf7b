//! Typing signals.
//!
//! [`TypingCoordinator`] turns local keystrokes into debounced start/stop
//! signals for the server. [`TypingIndicators`] tracks which remote users are
//! typing, expiring entries that are not refreshed.
//!
//! Both are pure state machines with deadlines instead of timers. The auto-stop
//! deadline is always rescheduled together with the start debounce, and it is
//! checked first on poll, so a single idle period can never produce a late
//! start after its stop.

use std::{collections::HashMap, time::Duration};

use crate::env::TimePoint;

/// Delay between the first keystroke and the start signal.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Idle time after the last keystroke before the stop signal.
pub const DEFAULT_AUTO_STOP: Duration = Duration::from_millis(3000);

/// Typing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingConfig {
    /// Start-signal debounce.
    pub debounce: Duration,
    /// Auto-stop after inactivity. Also the expiry window for remote
    /// indicators.
    pub auto_stop: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self { debounce: DEFAULT_DEBOUNCE, auto_stop: DEFAULT_AUTO_STOP }
    }
}

/// Outbound typing signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// Viewer started typing.
    Start,
    /// Viewer stopped typing.
    Stop,
}

impl TypingSignal {
    /// Wire value of `isTyping`.
    pub fn is_typing(self) -> bool {
        matches!(self, Self::Start)
    }
}

/// Debounces local input into start/stop signals.
#[derive(Debug, Clone)]
pub struct TypingCoordinator<I> {
    config: TypingConfig,
    /// A start signal has been emitted and no stop since.
    started: bool,
    pending_start: Option<I>,
    auto_stop: Option<I>,
}

impl<I: TimePoint> TypingCoordinator<I> {
    /// Create an idle coordinator.
    pub fn new(config: TypingConfig) -> Self {
        Self { config, started: false, pending_start: None, auto_stop: None }
    }

    /// True if the server currently believes the viewer is typing.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Earliest pending deadline.
    pub fn deadline(&self) -> Option<I> {
        match (self.pending_start, self.auto_stop) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Input text changed.
    ///
    /// Empty input stops immediately. Non-empty input schedules a start (if
    /// none was sent or is pending) and reschedules the auto-stop.
    pub fn on_input(&mut self, text: &str, now: I) -> Option<TypingSignal> {
        if text.trim().is_empty() {
            return self.stop();
        }

        if !self.started && self.pending_start.is_none() {
            self.pending_start = Some(now + self.config.debounce);
        }
        self.auto_stop = Some(now + self.config.auto_stop);
        None
    }

    /// Blur, send, or teardown: cancel timers and stop synchronously if a
    /// start was sent.
    pub fn stop(&mut self) -> Option<TypingSignal> {
        self.pending_start = None;
        self.auto_stop = None;

        if self.started {
            self.started = false;
            Some(TypingSignal::Stop)
        } else {
            None
        }
    }

    /// Fire due deadlines.
    pub fn poll(&mut self, now: I) -> Option<TypingSignal> {
        if self.auto_stop.is_some_and(|deadline| now >= deadline) {
            return self.stop();
        }

        if self.pending_start.is_some_and(|deadline| now >= deadline) {
            self.pending_start = None;
            self.started = true;
            return Some(TypingSignal::Start);
        }

        None
    }
}

/// Remote user currently typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUser {
    /// User id.
    pub user_id: String,
    /// Display name.
    pub user_name: String,
}

#[derive(Debug, Clone)]
struct Indicator<I> {
    user_name: String,
    updated_at: I,
}

/// Remote typing indicators with implicit expiry.
#[derive(Debug, Clone)]
pub struct TypingIndicators<I> {
    expiry: Duration,
    users: HashMap<String, Indicator<I>>,
}

impl<I: TimePoint> TypingIndicators<I> {
    /// Create an empty set; entries expire after `expiry` without refresh.
    pub fn new(expiry: Duration) -> Self {
        Self { expiry, users: HashMap::new() }
    }

    /// Apply a typing event. Returns true if the visible set changed.
    pub fn apply(&mut self, user_id: &str, user_name: &str, is_typing: bool, now: I) -> bool {
        if is_typing {
            let previous = self.users.insert(user_id.to_string(), Indicator {
                user_name: user_name.to_string(),
                updated_at: now,
            });
            previous.is_none()
        } else {
            self.users.remove(user_id).is_some()
        }
    }

    /// Remove a user (their message arrived).
    pub fn clear(&mut self, user_id: &str) -> bool {
        self.users.remove(user_id).is_some()
    }

    /// Remove every entry not refreshed within the expiry window.
    pub fn expire(&mut self, now: I) -> bool {
        let before = self.users.len();
        let expiry = self.expiry;
        self.users.retain(|_, indicator| now.saturating_since(indicator.updated_at) < expiry);
        self.users.len() != before
    }

    /// Drop everything.
    pub fn reset(&mut self) {
        self.users.clear();
    }

    /// Earliest expiry deadline.
    pub fn deadline(&self) -> Option<I> {
        self.users.values().map(|indicator| indicator.updated_at + self.expiry).min()
    }

    /// Users typing at `now`, sorted by name for stable display.
    pub fn active(&self, now: I) -> Vec<TypingUser> {
        let mut users: Vec<_> = self
            .users
            .iter()
            .filter(|(_, indicator)| now.saturating_since(indicator.updated_at) < self.expiry)
            .map(|(user_id, indicator)| TypingUser {
                user_id: user_id.clone(),
                user_name: indicator.user_name.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.user_name.cmp(&b.user_name).then_with(|| a.user_id.cmp(&b.user_id)));
        users
    }
}
