//! Metrics collection for lifecycle coordinator monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle coordinator metrics.
pub struct LifecycleMetrics {
    /// Cluster change events received.
    pub events_received: AtomicU64,
    /// Automatic transitions handed to the background executor.
    pub transitions_forked: AtomicU64,
    /// Automatic transitions the executor refused.
    pub transitions_rejected: AtomicU64,
    /// Transitions skipped because a precondition did not hold.
    pub transitions_skipped: AtomicU64,
    /// Calls made to the service's start.
    pub start_attempts: AtomicU64,
    /// Starts that returned successfully.
    pub starts_succeeded: AtomicU64,
    /// Starts that returned an error.
    pub starts_failed: AtomicU64,
    /// Calls made to the service's stop.
    pub stop_attempts: AtomicU64,
    /// Operator start/stop requests.
    pub manual_requests: AtomicU64,
}

impl LifecycleMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            transitions_forked: AtomicU64::new(0),
            transitions_rejected: AtomicU64::new(0),
            transitions_skipped: AtomicU64::new(0),
            start_attempts: AtomicU64::new(0),
            starts_succeeded: AtomicU64::new(0),
            starts_failed: AtomicU64::new(0),
            stop_attempts: AtomicU64::new(0),
            manual_requests: AtomicU64::new(0),
        }
    }

    /// Increment events received.
    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transition handed to the executor.
    pub fn transition_forked(&self) {
        self.transitions_forked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transition the executor refused.
    pub fn transition_rejected(&self) {
        self.transitions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped transition.
    pub fn transition_skipped(&self) {
        self.transitions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call to start.
    pub fn start_attempted(&self) {
        self.start_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful start.
    pub fn start_succeeded(&self) {
        self.starts_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed start.
    pub fn start_failed(&self) {
        self.starts_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call to stop.
    pub fn stop_attempted(&self) {
        self.stop_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an operator request.
    pub fn manual_request(&self) {
        self.manual_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            transitions_forked: self.transitions_forked.load(Ordering::Relaxed),
            transitions_rejected: self.transitions_rejected.load(Ordering::Relaxed),
            transitions_skipped: self.transitions_skipped.load(Ordering::Relaxed),
            start_attempts: self.start_attempts.load(Ordering::Relaxed),
            starts_succeeded: self.starts_succeeded.load(Ordering::Relaxed),
            starts_failed: self.starts_failed.load(Ordering::Relaxed),
            stop_attempts: self.stop_attempts.load(Ordering::Relaxed),
            manual_requests: self.manual_requests.load(Ordering::Relaxed),
        }
    }
}

impl Default for LifecycleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub transitions_forked: u64,
    pub transitions_rejected: u64,
    pub transitions_skipped: u64,
    pub start_attempts: u64,
    pub starts_succeeded: u64,
    pub starts_failed: u64,
    pub stop_attempts: u64,
    pub manual_requests: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<LifecycleMetrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = LifecycleMetrics::new();

        metrics.start_attempted();
        metrics.start_attempted();
        metrics.start_succeeded();
        metrics.start_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.start_attempts, 2);
        assert_eq!(snapshot.starts_succeeded, 1);
        assert_eq!(snapshot.starts_failed, 1);
        assert_eq!(snapshot.stop_attempts, 0);
    }
}
