//! Connection quality monitor.
//!
//! Derives a coarse health signal from the time elapsed since the last
//! heartbeat, independent of raw stream state. The check runs on a periodic
//! deadline that only exists while the monitor is started.

use std::time::Duration;

use serde::Serialize;

use crate::env::TimePoint;

/// Longest heartbeat gap still classified as excellent.
pub const EXCELLENT_WITHIN: Duration = Duration::from_secs(35);

/// Longest heartbeat gap still classified as good.
pub const GOOD_WITHIN: Duration = Duration::from_secs(45);

/// Longest heartbeat gap still classified as poor. Beyond this the stream is
/// treated as dead.
pub const POOR_WITHIN: Duration = Duration::from_secs(90);

/// Interval between quality checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Coarse connection health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    /// Heartbeat within 35s.
    Excellent,
    /// Heartbeat within 45s.
    Good,
    /// Heartbeat within 90s.
    Poor,
    /// No heartbeat for more than 90s, or no stream at all.
    Disconnected,
}

impl ConnectionQuality {
    /// Classify a heartbeat gap.
    pub fn classify(elapsed: Duration) -> Self {
        if elapsed <= EXCELLENT_WITHIN {
            Self::Excellent
        } else if elapsed <= GOOD_WITHIN {
            Self::Good
        } else if elapsed <= POOR_WITHIN {
            Self::Poor
        } else {
            Self::Disconnected
        }
    }
}

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityConfig {
    /// How often the heartbeat gap is re-classified.
    pub check_interval: Duration,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self { check_interval: DEFAULT_CHECK_INTERVAL }
    }
}

/// Heartbeat-based quality monitor.
#[derive(Debug, Clone)]
pub struct QualityMonitor<I> {
    config: QualityConfig,
    last_heartbeat: Option<I>,
    next_check: Option<I>,
    quality: ConnectionQuality,
}

impl<I: TimePoint> QualityMonitor<I> {
    /// Create a stopped monitor.
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            last_heartbeat: None,
            next_check: None,
            quality: ConnectionQuality::Disconnected,
        }
    }

    /// Current classification.
    pub fn quality(&self) -> ConnectionQuality {
        self.quality
    }

    /// True while the periodic check is scheduled.
    pub fn is_running(&self) -> bool {
        self.next_check.is_some()
    }

    /// Next scheduled check.
    pub fn deadline(&self) -> Option<I> {
        self.next_check
    }

    /// Start monitoring a freshly opened stream. The open counts as a
    /// heartbeat.
    pub fn start(&mut self, now: I) {
        self.last_heartbeat = Some(now);
        self.next_check = Some(now + self.config.check_interval);
        self.quality = ConnectionQuality::Excellent;
    }

    /// Record a heartbeat (ping or any other inbound event).
    pub fn heartbeat(&mut self, now: I) {
        if self.is_running() {
            self.last_heartbeat = Some(now);
        }
    }

    /// Stop monitoring. Clears the timer; quality becomes disconnected.
    pub fn stop(&mut self) {
        self.next_check = None;
        self.last_heartbeat = None;
        self.quality = ConnectionQuality::Disconnected;
    }

    /// Run the check if it is due.
    ///
    /// Returns the new quality when it changed. A `Disconnected` result also
    /// stops the monitor.
    pub fn poll(&mut self, now: I) -> Option<ConnectionQuality> {
        let due = self.next_check?;
        if now < due {
            return None;
        }

        let last = self.last_heartbeat?;
        let quality = ConnectionQuality::classify(now.saturating_since(last));
        self.next_check = Some(now + self.config.check_interval);

        if quality == ConnectionQuality::Disconnected {
            self.stop();
            return Some(ConnectionQuality::Disconnected);
        }

        if quality == self.quality {
            return None;
        }
        self.quality = quality;
        Some(quality)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn classification_thresholds() {
        let classify = |secs| ConnectionQuality::classify(Duration::from_secs(secs));

        assert_eq!(classify(0), ConnectionQuality::Excellent);
        assert_eq!(classify(35), ConnectionQuality::Excellent);
        assert_eq!(classify(36), ConnectionQuality::Good);
        assert_eq!(classify(45), ConnectionQuality::Good);
        assert_eq!(classify(46), ConnectionQuality::Poor);
        assert_eq!(classify(90), ConnectionQuality::Poor);
        assert_eq!(classify(91), ConnectionQuality::Disconnected);
    }

    #[test]
    fn degrades_without_heartbeats() {
        let t0 = Instant::now();
        let mut monitor = QualityMonitor::new(QualityConfig::default());
        monitor.start(t0);

        let mut changes = Vec::new();
        for secs in (5..=100).step_by(5) {
            if let Some(quality) = monitor.poll(t0 + Duration::from_secs(secs)) {
                changes.push((secs, quality));
            }
        }

        assert_eq!(changes, vec![
            (40, ConnectionQuality::Good),
            (50, ConnectionQuality::Poor),
            (95, ConnectionQuality::Disconnected),
        ]);
        assert!(!monitor.is_running());
    }

    #[test]
    fn heartbeat_restores_excellent() {
        let t0 = Instant::now();
        let mut monitor = QualityMonitor::new(QualityConfig::default());
        monitor.start(t0);

        assert_eq!(monitor.poll(t0 + Duration::from_secs(50)), Some(ConnectionQuality::Poor));
        monitor.heartbeat(t0 + Duration::from_secs(52));
        assert_eq!(monitor.poll(t0 + Duration::from_secs(55)), Some(ConnectionQuality::Excellent));
    }

    #[test]
    fn not_due_before_interval() {
        let t0 = Instant::now();
        let mut monitor = QualityMonitor::new(QualityConfig::default());
        monitor.start(t0);

        assert_eq!(monitor.poll(t0 + Duration::from_secs(4)), None);
        assert_eq!(monitor.deadline(), Some(t0 + DEFAULT_CHECK_INTERVAL));
    }

    #[test]
    fn stopped_monitor_never_reports() {
        let t0 = Instant::now();
        let mut monitor = QualityMonitor::new(QualityConfig::default());
        monitor.start(t0);
        monitor.stop();

        assert_eq!(monitor.poll(t0 + Duration::from_secs(500)), None);
        assert!(monitor.deadline().is_none());
        assert_eq!(monitor.quality(), ConnectionQuality::Disconnected);
    }
}
