//! Per-subscriber connected/disconnected signal.
//!
//! Derived purely from what a subscriber receives: a delivered reading means
//! telemetry is flowing, a delivery failure or an empty current slot means it
//! is not. It has no effect on ingestion or storage.

use crate::broker::Notification;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Thread-safe connection flag with change counting.
///
/// The version is incremented each time the flag flips, so renderers can
/// cheaply detect that the connection indicator needs redrawing.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connected: AtomicBool,
    version: AtomicU32,
}

impl ConnectionTracker {
    /// Starts disconnected until a reading is seen.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Set the flag. Returns true if it changed.
    pub fn set(&self, connected: bool) -> bool {
        let old = self.connected.swap(connected, Ordering::SeqCst);
        if old != connected {
            self.version.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Transport-level error outside the notification stream.
    pub fn mark_disconnected(&self) -> bool {
        self.set(false)
    }

    /// Update from a delivered notification. Returns true if the flag changed.
    pub fn observe(&self, notification: &Notification) -> bool {
        match notification {
            Notification::Reading(_) => self.set(true),
            Notification::Snapshot { reading, .. } => self.set(reading.is_some()),
            Notification::DeliveryFailed => self.set(false),
            Notification::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::SnapshotCause;
    use crate::model::{Configuration, Reading};
    use std::sync::Arc;

    fn reading() -> Arc<Reading> {
        Arc::new(Reading {
            moisture_percent: 40,
            is_irrigating: false,
            captured_at: 0,
        })
    }

    #[test]
    fn test_initial_state() {
        let tracker = ConnectionTracker::new();
        assert!(!tracker.is_connected());
        assert_eq!(tracker.version(), 0);
    }

    #[test]
    fn test_reading_connects_failure_disconnects() {
        let tracker = ConnectionTracker::new();

        assert!(tracker.observe(&Notification::Reading(reading())));
        assert!(tracker.is_connected());
        assert_eq!(tracker.version(), 1);

        // Same value does not bump the version.
        assert!(!tracker.observe(&Notification::Reading(reading())));
        assert_eq!(tracker.version(), 1);

        assert!(tracker.observe(&Notification::DeliveryFailed));
        assert!(!tracker.is_connected());
        assert_eq!(tracker.version(), 2);
    }

    #[test]
    fn test_snapshot_without_reading_is_no_data() {
        let tracker = ConnectionTracker::new();
        tracker.set(true);

        let snapshot = Notification::Snapshot {
            cause: SnapshotCause::Initial,
            config: Arc::new(Configuration::default()),
            reading: None,
        };
        tracker.observe(&snapshot);
        assert!(!tracker.is_connected());
    }

    #[test]
    fn test_config_does_not_affect_liveness() {
        let tracker = ConnectionTracker::new();
        tracker.set(true);
        assert!(!tracker.observe(&Notification::Config(Arc::new(Configuration::default()))));
        assert!(tracker.is_connected());

        assert!(tracker.mark_disconnected());
        assert!(!tracker.is_connected());
    }
}
