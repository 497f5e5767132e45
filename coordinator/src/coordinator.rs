//! Lifecycle coordinator for the watch service.
//!
//! Decides when the managed service starts and stops, from two inputs:
//! cluster change events (is this node master, has the cluster recovered)
//! and operator start/stop commands. Every transition runs under a single
//! per-coordinator lock and re-reads the service state before acting, so
//! transitions forked from events may run out of event order without
//! harm: a stale transition finds the service in the wrong state and does
//! nothing.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use watchkeeper_common::{ClusterSnapshot, NodeId, ServiceState};

use crate::cluster::{ClusterChangedEvent, ClusterEventBus, ClusterStateListener, LifecycleListener};
use crate::config::LifecycleConfig;
use crate::executor::BackgroundExecutor;
use crate::metrics::{LifecycleMetrics, SharedMetrics};
use crate::service::ManagedService;

/// Starts and stops a [`ManagedService`] as the local node gains or loses
/// the master role, while honouring operator commands.
pub struct LifecycleCoordinator {
    /// State shared with forked transitions.
    inner: Arc<Transitions>,
    /// Where automatic transitions run.
    executor: Arc<dyn BackgroundExecutor>,
}

struct Transitions {
    service: Arc<dyn ManagedService>,
    /// Whether the last operator-requested transition was a stop.
    manually_stopped: AtomicBool,
    /// Set by the node shutdown hook. Automatic transitions are refused
    /// from then on.
    closing: AtomicBool,
    /// Held for the whole of every start or stop decision.
    transition_lock: Mutex<()>,
    /// Latest snapshot seen, used by operator starts.
    last_snapshot: RwLock<Arc<ClusterSnapshot>>,
    metrics: SharedMetrics,
}

impl LifecycleCoordinator {
    /// Create a coordinator. It receives no events until
    /// [`register`](Self::register) is called.
    pub fn new(
        config: &LifecycleConfig,
        local_node: NodeId,
        service: Arc<dyn ManagedService>,
        executor: Arc<dyn BackgroundExecutor>,
    ) -> Self {
        Self {
            inner: Arc::new(Transitions {
                service,
                manually_stopped: AtomicBool::new(config.initially_stopped()),
                closing: AtomicBool::new(false),
                transition_lock: Mutex::new(()),
                last_snapshot: RwLock::new(Arc::new(ClusterSnapshot::initial(local_node))),
                metrics: Arc::new(LifecycleMetrics::new()),
            }),
            executor,
        }
    }

    /// Subscribe to cluster events and to the bus shutdown hook.
    pub fn register(self: &Arc<Self>, bus: &ClusterEventBus) {
        self.inner.observe(bus.state());
        bus.add_listener(self.clone());
        bus.add_lifecycle_listener(self.clone());
        debug!(node = %bus.local_node(), "lifecycle coordinator registered");
    }

    /// Operator request to start the watch service against the latest
    /// observed cluster snapshot. Clears any earlier operator stop.
    /// Returns once the attempt is over, whether or not it started.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        self.inner.metrics.manual_request();
        let snapshot = self.inner.last_snapshot();
        self.inner.attempt_start(&snapshot, true).await;
    }

    /// Operator request to stop the watch service. Blocks until the service
    /// has shut down, and keeps automatic starts from running afterwards.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.inner.metrics.manual_request();
        self.inner.attempt_stop(true).await;
    }

    /// Whether the last operator-requested transition was a stop.
    pub fn is_manually_stopped(&self) -> bool {
        self.inner.manually_stopped.load(Ordering::Acquire)
    }

    /// Current state of the managed service.
    pub fn service_state(&self) -> ServiceState {
        self.inner.service.state()
    }

    /// Latest cluster snapshot this coordinator has seen.
    pub fn last_snapshot(&self) -> Arc<ClusterSnapshot> {
        self.inner.last_snapshot()
    }

    /// Coordinator metrics.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.inner.metrics
    }

    fn fork<F>(&self, transition: &'static str, version: u64, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.is_closing() {
            self.inner.metrics.transition_rejected();
            debug!(transition, version, "node stopping, not forking watch service transition");
            return;
        }

        match self.executor.execute(Box::pin(task)) {
            Ok(()) => {
                self.inner.metrics.transition_forked();
                debug!(transition, version, "forked watch service transition");
            }
            Err(e) => {
                self.inner.metrics.transition_rejected();
                warn!(transition, version, error = %e, "failed to fork watch service transition");
            }
        }
    }
}

impl ClusterStateListener for LifecycleCoordinator {
    fn cluster_changed(&self, event: &ClusterChangedEvent) {
        self.inner.metrics.event_received();
        self.inner.observe(event.state().clone());

        if event.master_changed() {
            debug!(
                version = event.version(),
                master = ?event.state().master_node,
                previous = ?event.previous_state().master_node,
                "elected master changed"
            );
        }

        if self.inner.is_closing() {
            trace!(version = event.version(), "node stopping, ignoring cluster change");
            return;
        }

        if !event.local_node_master() {
            if !self.inner.service.state().is_started() {
                // nothing to stop, don't fork
                return;
            }

            // No longer master. Stopping waits for running watches to drain,
            // which must not hold up this or any other listener.
            let inner = self.inner.clone();
            self.fork("stop", event.version(), async move {
                inner.attempt_stop(false).await;
            });
            return;
        }

        if event.state().is_recovery_blocked() {
            // Watch state may not be restored from disk yet.
            trace!(version = event.version(), "cluster not recovered, not starting watch service");
            return;
        }

        if !self.inner.service.state().is_stopped() {
            return;
        }

        // Advisory only; attempt_start checks again under the lock.
        if self.inner.manually_stopped.load(Ordering::Acquire) {
            debug!(
                version = event.version(),
                "watch service was stopped manually, not forking automatic start"
            );
            self.inner.metrics.transition_skipped();
            return;
        }

        let inner = self.inner.clone();
        let snapshot = event.state().clone();
        self.fork("start", event.version(), async move {
            inner.attempt_start(&snapshot, false).await;
        });
    }
}

#[async_trait]
impl LifecycleListener for LifecycleCoordinator {
    async fn before_stop(&self) {
        // Stop before the rest of the node tears down, so no watch runs
        // against infrastructure that is going away. A forked transition
        // already holding the lock finishes first; any that runs later is
        // refused.
        info!("node stopping, stopping watch service");
        self.inner.closing.store(true, Ordering::Release);
        self.stop().await;
    }
}

impl Transitions {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Automatic transitions that reach the lock after shutdown began.
    fn refuse_automatic(&self, manual: bool, transition: &'static str) -> bool {
        if manual || !self.is_closing() {
            return false;
        }
        debug!(transition, "node stopping, dropping automatic watch service transition");
        self.metrics.transition_skipped();
        true
    }

    fn last_snapshot(&self) -> Arc<ClusterSnapshot> {
        self.last_snapshot.read().clone()
    }

    fn observe(&self, snapshot: Arc<ClusterSnapshot>) {
        let mut last = self.last_snapshot.write();
        if snapshot.version >= last.version {
            *last = snapshot;
        }
    }

    async fn attempt_stop(&self, manual: bool) {
        let _guard = self.transition_lock.lock().await;
        if self.refuse_automatic(manual, "stop") {
            return;
        }

        // Recorded even when nothing is running: an operator stop must hold
        // back later automatic starts, and an automatic stop resets it.
        self.manually_stopped.store(manual, Ordering::Release);

        let state = self.service.state();
        if !state.is_started() {
            debug!(
                current = %state,
                manual,
                "not stopping watch service, it can only stop when [started]"
            );
            self.metrics.transition_skipped();
            return;
        }

        info!(manual, "Stopping watch service");
        self.metrics.stop_attempted();
        self.service.stop().await;
        info!(manual, state = %self.service.state(), "Watch service stopped");
    }

    async fn attempt_start(&self, snapshot: &ClusterSnapshot, manual: bool) {
        let _guard = self.transition_lock.lock().await;
        if self.refuse_automatic(manual, "start") {
            return;
        }

        let state = self.service.state();
        if !state.is_stopped() {
            debug!(
                current = %state,
                manual,
                "not starting watch service, it can only start when [stopped]"
            );
            self.metrics.transition_skipped();
            return;
        }

        if manual {
            self.manually_stopped.store(false, Ordering::Release);
        } else if self.manually_stopped.load(Ordering::Acquire) {
            debug!("not starting watch service, it was stopped manually and cannot be started automatically");
            self.metrics.transition_skipped();
            return;
        }

        if !self.service.validate(snapshot) {
            debug!(
                version = snapshot.version,
                "not starting watch service, the cluster isn't ready to run it yet"
            );
            self.metrics.transition_skipped();
            return;
        }

        trace!(version = snapshot.version, manual, "starting watch service");
        self.metrics.start_attempted();
        match self.service.start(snapshot).await {
            Ok(()) => {
                self.metrics.start_succeeded();
                info!(version = snapshot.version, manual, "Watch service started");
            }
            Err(e) => {
                self.metrics.start_failed();
                warn!(
                    version = snapshot.version,
                    manual,
                    error = %e,
                    retryable = e.is_retryable(),
                    "failed to start watch service. wait for the cluster to become ready or start it manually"
                );
            }
        }
    }
}
