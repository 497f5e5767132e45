//! Simulated watch service.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use watchkeeper_common::{ClusterSnapshot, NodeId, Result, ServiceState, WatcherError};
use watchkeeper_coordinator::ManagedService;

/// A stand-in for the watch execution engine on one node.
pub struct SimulatedWatchService {
    /// Node this service runs on.
    pub node: NodeId,
    /// Current state.
    state: RwLock<ServiceState>,
    /// Time taken to load watches on start.
    start_delay: Duration,
    /// Time taken for the scheduler to drain on stop.
    stop_delay: Duration,
    /// When set, start fails after loading.
    fail_start: AtomicBool,
    /// When set, validation reports the watch index as missing.
    index_missing: AtomicBool,
    starts: AtomicU64,
    stops: AtomicU64,
}

impl SimulatedWatchService {
    /// Create a stopped service.
    pub fn new(node: NodeId, start_delay: Duration, stop_delay: Duration) -> Self {
        Self {
            node,
            state: RwLock::new(ServiceState::Stopped),
            start_delay,
            stop_delay,
            fail_start: AtomicBool::new(false),
            index_missing: AtomicBool::new(false),
            starts: AtomicU64::new(0),
            stops: AtomicU64::new(0),
        }
    }

    /// Make subsequent starts fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent validations fail.
    pub fn set_index_missing(&self, missing: bool) {
        self.index_missing.store(missing, Ordering::SeqCst);
    }

    /// Completed starts.
    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }

    /// Completed stops.
    pub fn stop_count(&self) -> u64 {
        self.stops.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ManagedService for SimulatedWatchService {
    fn state(&self) -> ServiceState {
        *self.state.read()
    }

    fn validate(&self, snapshot: &ClusterSnapshot) -> bool {
        snapshot.master_node.is_some() && !self.index_missing.load(Ordering::SeqCst)
    }

    async fn start(&self, snapshot: &ClusterSnapshot) -> Result<()> {
        *self.state.write() = ServiceState::Starting;
        debug!(node = %self.node, version = snapshot.version, "loading watches");
        tokio::time::sleep(self.start_delay).await;

        if self.fail_start.load(Ordering::SeqCst) {
            *self.state.write() = ServiceState::Stopped;
            return Err(WatcherError::StartFailed(format!(
                "could not load watches on {}",
                self.node
            )));
        }

        *self.state.write() = ServiceState::Started;
        self.starts.fetch_add(1, Ordering::Relaxed);
        info!(node = %self.node, version = snapshot.version, "watch service running");
        Ok(())
    }

    async fn stop(&self) {
        *self.state.write() = ServiceState::Stopping;
        debug!(node = %self.node, "draining trigger scheduler");
        tokio::time::sleep(self.stop_delay).await;
        *self.state.write() = ServiceState::Stopped;
        self.stops.fetch_add(1, Ordering::Relaxed);
        info!(node = %self.node, "watch service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchkeeper_common::ClusterBlock;

    fn service() -> SimulatedWatchService {
        SimulatedWatchService::new(NodeId::new("node-1"), Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_start_stop() {
        let service = service();
        let snapshot = ClusterSnapshot::new(1, service.node.clone())
            .with_master(Some(service.node.clone()));

        assert!(service.validate(&snapshot));
        service.start(&snapshot).await.unwrap();
        assert_eq!(service.state(), ServiceState::Started);

        service.stop().await;
        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(service.start_count(), 1);
        assert_eq!(service.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_start_returns_to_stopped() {
        let service = service();
        service.set_fail_start(true);
        let snapshot = ClusterSnapshot::new(1, service.node.clone());

        assert!(service.start(&snapshot).await.is_err());
        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(service.start_count(), 0);
    }

    #[test]
    fn test_validation() {
        let service = service();
        let leaderless = ClusterSnapshot::initial(service.node.clone())
            .without_block(ClusterBlock::StateNotRecovered);
        assert!(!service.validate(&leaderless));

        let elected = leaderless.next_version().with_master(Some(NodeId::new("node-2")));
        assert!(service.validate(&elected));

        service.set_index_missing(true);
        assert!(!service.validate(&elected));
    }
}
