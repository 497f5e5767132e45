//! Cluster change notification.
//!
//! [`ClusterEventBus`] applies published snapshots one at a time on a single
//! dispatch task and calls every registered [`ClusterStateListener`] in
//! registration order before moving on to the next snapshot.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace};

use watchkeeper_common::{ClusterSnapshot, NodeId, Result, WatcherError};

/// A transition from one applied snapshot to the next.
#[derive(Debug, Clone)]
pub struct ClusterChangedEvent {
    state: Arc<ClusterSnapshot>,
    previous: Arc<ClusterSnapshot>,
}

impl ClusterChangedEvent {
    /// Create an event from the new and previous snapshots.
    pub fn new(state: Arc<ClusterSnapshot>, previous: Arc<ClusterSnapshot>) -> Self {
        Self { state, previous }
    }

    /// The newly applied snapshot.
    pub fn state(&self) -> &Arc<ClusterSnapshot> {
        &self.state
    }

    /// The snapshot that was applied before this one.
    pub fn previous_state(&self) -> &Arc<ClusterSnapshot> {
        &self.previous
    }

    /// Version of the new snapshot.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Whether the local node is master in the new snapshot.
    pub fn local_node_master(&self) -> bool {
        self.state.is_local_node_master()
    }

    /// Whether the elected master differs between the two snapshots.
    pub fn master_changed(&self) -> bool {
        self.state.master_node != self.previous.master_node
    }
}

/// Receives every applied cluster snapshot.
///
/// Called on the dispatch task; implementations must return promptly and
/// hand any slow work to an executor.
pub trait ClusterStateListener: Send + Sync {
    /// Called once per applied snapshot, in version order.
    fn cluster_changed(&self, event: &ClusterChangedEvent);
}

/// Hooks into the shutdown of the event bus.
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    /// Runs to completion before the bus stops dispatching.
    async fn before_stop(&self);
}

type Listeners = Arc<RwLock<Vec<Arc<dyn ClusterStateListener>>>>;

/// In-process source of cluster change events for one node.
pub struct ClusterEventBus {
    local_node: NodeId,
    applied: Arc<watch::Sender<Arc<ClusterSnapshot>>>,
    listeners: Listeners,
    lifecycle_listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
    /// Set once `stop` begins; queued snapshots are dropped from then on.
    closed: Arc<AtomicBool>,
    sender: Mutex<Option<mpsc::UnboundedSender<ClusterSnapshot>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ClusterSnapshot>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterEventBus {
    /// Create a bus for the given node, holding its initial snapshot.
    pub fn new(local_node: NodeId) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (applied, _) = watch::channel(Arc::new(ClusterSnapshot::initial(local_node.clone())));

        Self {
            local_node,
            applied: Arc::new(applied),
            listeners: Arc::new(RwLock::new(Vec::new())),
            lifecycle_listeners: RwLock::new(Vec::new()),
            closed: Arc::new(AtomicBool::new(false)),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            dispatcher: Mutex::new(None),
        }
    }

    /// The node this bus delivers events for.
    pub fn local_node(&self) -> &NodeId {
        &self.local_node
    }

    /// Register a cluster state listener.
    pub fn add_listener(&self, listener: Arc<dyn ClusterStateListener>) {
        self.listeners.write().push(listener);
    }

    /// Register a lifecycle listener.
    pub fn add_lifecycle_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.lifecycle_listeners.write().push(listener);
    }

    /// Start the dispatch task. Snapshots published earlier are delivered
    /// once it runs. Calling this twice has no effect.
    pub fn start(&self) {
        let Some(receiver) = self.receiver.lock().take() else {
            debug!(node = %self.local_node, "cluster event dispatcher already started");
            return;
        };

        let applied = self.applied.clone();
        let listeners = self.listeners.clone();
        let closed = self.closed.clone();
        let node = self.local_node.clone();
        let handle = tokio::spawn(dispatch_loop(node, receiver, applied, listeners, closed));
        *self.dispatcher.lock() = Some(handle);

        info!(node = %self.local_node, "Cluster event dispatcher started");
    }

    /// Queue a snapshot for dispatch.
    pub fn publish(&self, snapshot: ClusterSnapshot) -> Result<()> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or_else(|| {
            WatcherError::InternalError("cluster event bus is stopped".to_string())
        })?;

        sender
            .send(snapshot)
            .map_err(|_| WatcherError::InternalError("cluster event dispatcher is gone".to_string()))
    }

    /// The most recent snapshot every listener has been notified of.
    pub fn state(&self) -> Arc<ClusterSnapshot> {
        self.applied.borrow().clone()
    }

    /// Wait until a snapshot at or beyond `version` has been applied and
    /// all listeners have seen it.
    pub async fn wait_for_version(&self, version: u64) {
        let mut applied = self.applied.subscribe();
        loop {
            if applied.borrow_and_update().version >= version {
                return;
            }
            if applied.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stop dispatching, then run every lifecycle listener's `before_stop`
    /// hook. Snapshots still queued are discarded and a listener call in
    /// progress finishes first, so no listener runs alongside the hooks.
    /// Waiting on a discarded version never returns.
    #[instrument(skip(self), fields(node = %self.local_node))]
    pub async fn stop(&self) {
        info!("Stopping cluster event bus");

        self.closed.store(true, Ordering::Release);
        self.sender.lock().take();
        self.receiver.lock().take();
        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                error!(error = %e, "Cluster event dispatcher ended abnormally");
            }
        }

        let hooks = self.lifecycle_listeners.read().clone();
        for hook in hooks {
            hook.before_stop().await;
        }

        info!("Cluster event bus stopped");
    }
}

async fn dispatch_loop(
    node: NodeId,
    mut receiver: mpsc::UnboundedReceiver<ClusterSnapshot>,
    applied: Arc<watch::Sender<Arc<ClusterSnapshot>>>,
    listeners: Listeners,
    closed: Arc<AtomicBool>,
) {
    while let Some(snapshot) = receiver.recv().await {
        if closed.load(Ordering::Acquire) {
            debug!(node = %node, version = snapshot.version, "bus stopping, discarding cluster snapshot");
            continue;
        }

        let previous = applied.borrow().clone();
        if snapshot.version <= previous.version {
            debug!(
                node = %node,
                version = snapshot.version,
                applied_version = previous.version,
                "ignoring stale cluster snapshot"
            );
            continue;
        }

        let state = Arc::new(snapshot);
        let event = ClusterChangedEvent::new(state.clone(), previous);
        trace!(node = %node, version = state.version, "applying cluster snapshot");

        let listeners = listeners.read().clone();
        for listener in listeners {
            let delivered = catch_unwind(AssertUnwindSafe(|| listener.cluster_changed(&event)));
            if delivered.is_err() {
                error!(node = %node, version = state.version, "cluster state listener panicked");
            }
        }

        applied.send_replace(state);
    }

    debug!(node = %node, "cluster event dispatcher exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        versions: Mutex<Vec<(u64, bool)>>,
    }

    impl ClusterStateListener for Recorder {
        fn cluster_changed(&self, event: &ClusterChangedEvent) {
            self.versions
                .lock()
                .push((event.version(), event.local_node_master()));
        }
    }

    struct Panicker;

    impl ClusterStateListener for Panicker {
        fn cluster_changed(&self, _event: &ClusterChangedEvent) {
            panic!("listener failure");
        }
    }

    /// Holds the dispatcher inside the first event for a while.
    #[derive(Default)]
    struct SlowRecorder {
        versions: Mutex<Vec<u64>>,
    }

    impl ClusterStateListener for SlowRecorder {
        fn cluster_changed(&self, event: &ClusterChangedEvent) {
            self.versions.lock().push(event.version());
            if event.version() == 1 {
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }

    #[derive(Default)]
    struct StopHook {
        called: AtomicBool,
    }

    #[async_trait]
    impl LifecycleListener for StopHook {
        async fn before_stop(&self) {
            self.called.store(true, Ordering::SeqCst);
        }
    }

    fn node() -> NodeId {
        NodeId::new("node-1")
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let bus = ClusterEventBus::new(node());
        let recorder = Arc::new(Recorder::default());
        bus.add_listener(recorder.clone());
        bus.start();

        let first = bus.state().next_version().with_master(Some(node()));
        let second = first.next_version().with_master(Some(NodeId::new("node-2")));
        bus.publish(first).unwrap();
        bus.publish(second).unwrap();
        bus.wait_for_version(2).await;

        assert_eq!(*recorder.versions.lock(), vec![(1, true), (2, false)]);
        assert_eq!(bus.state().version, 2);
    }

    #[tokio::test]
    async fn test_ignores_stale_snapshots() {
        let bus = ClusterEventBus::new(node());
        let recorder = Arc::new(Recorder::default());
        bus.add_listener(recorder.clone());
        bus.start();

        let first = bus.state().next_version();
        let newer = first.next_version();
        let marker = newer.next_version();
        bus.publish(newer).unwrap();
        bus.publish(first).unwrap();
        bus.publish(marker).unwrap();
        bus.wait_for_version(3).await;

        let seen: Vec<u64> = recorder.versions.lock().iter().map(|(v, _)| *v).collect();
        assert_eq!(seen, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_listener_panic_does_not_stop_dispatch() {
        let bus = ClusterEventBus::new(node());
        let recorder = Arc::new(Recorder::default());
        bus.add_listener(Arc::new(Panicker));
        bus.add_listener(recorder.clone());
        bus.start();

        bus.publish(bus.state().next_version()).unwrap();
        bus.wait_for_version(1).await;

        assert_eq!(recorder.versions.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_runs_hooks_and_rejects_publish() {
        let bus = ClusterEventBus::new(node());
        let hook = Arc::new(StopHook::default());
        bus.add_lifecycle_listener(hook.clone());
        bus.start();

        bus.stop().await;

        assert!(hook.called.load(Ordering::SeqCst));
        assert!(bus.publish(bus.state().next_version()).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_discards_queued_snapshots_before_hooks() {
        let bus = ClusterEventBus::new(node());
        let recorder = Arc::new(SlowRecorder::default());
        let hook = Arc::new(StopHook::default());
        bus.add_listener(recorder.clone());
        bus.add_lifecycle_listener(hook.clone());
        bus.start();

        let first = bus.state().next_version();
        let second = first.next_version();
        let third = second.next_version();
        bus.publish(first).unwrap();
        bus.publish(second).unwrap();
        bus.publish(third).unwrap();

        while recorder.versions.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        bus.stop().await;

        assert_eq!(*recorder.versions.lock(), vec![1]);
        assert_eq!(bus.state().version, 1);
        assert!(hook.called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_master_changed() {
        let initial = Arc::new(ClusterSnapshot::initial(node()));
        let elected = Arc::new(initial.next_version().with_master(Some(node())));
        let event = ClusterChangedEvent::new(elected.clone(), initial);
        assert!(event.master_changed());
        assert!(event.local_node_master());

        let same = Arc::new(elected.next_version());
        let event = ClusterChangedEvent::new(same, elected);
        assert!(!event.master_changed());
    }
}
