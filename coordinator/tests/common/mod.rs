//! Shared fixtures for coordinator integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use watchkeeper_common::{ClusterBlock, ClusterSnapshot, NodeId, Result, ServiceState, WatcherError};
use watchkeeper_coordinator::{
    BoundedExecutor, ClusterEventBus, LifecycleConfig, LifecycleCoordinator, ManagedService,
};

/// Watch service double that records every start and stop it sees.
pub struct RecordingService {
    state: Mutex<ServiceState>,
    start_delay: Duration,
    stop_delay: Duration,
    pub fail_start: AtomicBool,
    pub valid: AtomicBool,
    log: Mutex<Vec<&'static str>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl RecordingService {
    pub fn new() -> Arc<Self> {
        Self::with_delays(Duration::ZERO, Duration::ZERO)
    }

    pub fn with_delays(start_delay: Duration, stop_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServiceState::Stopped),
            start_delay,
            stop_delay,
            fail_start: AtomicBool::new(false),
            valid: AtomicBool::new(true),
            log: Mutex::new(Vec::new()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn log(&self) -> Vec<&'static str> {
        self.log.lock().clone()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Wait up to two seconds for the service to reach `state`.
    pub async fn wait_for_state(&self, state: ServiceState) {
        let reached = tokio::time::timeout(Duration::from_secs(2), async {
            while self.state() != state {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "service never reached {state}, still {}", self.state());
    }
}

#[async_trait]
impl ManagedService for RecordingService {
    fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    fn validate(&self, _snapshot: &ClusterSnapshot) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    async fn start(&self, _snapshot: &ClusterSnapshot) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push("start:enter");
        *self.state.lock() = ServiceState::Starting;
        tokio::time::sleep(self.start_delay).await;

        let result = if self.fail_start.load(Ordering::SeqCst) {
            *self.state.lock() = ServiceState::Stopped;
            Err(WatcherError::StartFailed("triggered watches index is missing".into()))
        } else {
            *self.state.lock() = ServiceState::Started;
            Ok(())
        };
        self.log.lock().push("start:exit");
        result
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push("stop:enter");
        *self.state.lock() = ServiceState::Stopping;
        tokio::time::sleep(self.stop_delay).await;
        *self.state.lock() = ServiceState::Stopped;
        self.log.lock().push("stop:exit");
    }
}

/// One node wired the way a real process wires it.
pub struct TestNode {
    pub local: NodeId,
    pub bus: ClusterEventBus,
    pub executor: Arc<BoundedExecutor>,
    pub service: Arc<RecordingService>,
    pub coordinator: Arc<LifecycleCoordinator>,
    version: AtomicU64,
}

impl TestNode {
    pub fn new(config: LifecycleConfig, service: Arc<RecordingService>) -> Self {
        let local = NodeId::new("node-1");
        let bus = ClusterEventBus::new(local.clone());
        let executor = Arc::new(BoundedExecutor::current(&config.executor));
        let coordinator = Arc::new(LifecycleCoordinator::new(
            &config,
            local.clone(),
            service.clone(),
            executor.clone(),
        ));
        coordinator.register(&bus);
        bus.start();

        Self {
            local,
            bus,
            executor,
            service,
            coordinator,
            version: AtomicU64::new(0),
        }
    }

    /// Publish the next snapshot without waiting for it.
    pub fn publish(&self, master: bool, recovered: bool) -> u64 {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let master_node = if master {
            self.local.clone()
        } else {
            NodeId::new("node-2")
        };
        let mut snapshot = ClusterSnapshot::new(version, self.local.clone()).with_master(Some(master_node));
        if !recovered {
            snapshot = snapshot.with_block(ClusterBlock::StateNotRecovered);
        }
        self.bus.publish(snapshot).expect("bus accepts snapshots");
        version
    }

    /// Publish a snapshot and wait for it and any forked transition.
    pub async fn apply(&self, master: bool, recovered: bool) -> u64 {
        let version = self.publish(master, recovered);
        self.settle(version).await;
        version
    }

    pub async fn settle(&self, version: u64) {
        self.bus.wait_for_version(version).await;
        self.executor.wait_idle().await;
    }
}
