//! In-process cluster of simulated nodes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use watchkeeper_common::{
    ClusterBlock, ClusterSnapshot, NodeId, ServiceRequest, ServiceResponse, ServiceState, WatcherError,
};
use watchkeeper_coordinator::{
    BoundedExecutor, ClusterEventBus, LifecycleConfig, LifecycleCoordinator, ManagedService,
    MetricsSnapshot, ServiceCommandHandler,
};

use crate::service::SimulatedWatchService;

/// One simulated node, wired the way a node process wires itself.
pub struct SimNode {
    /// Node identifier.
    pub id: NodeId,
    /// Cluster events for this node.
    pub bus: ClusterEventBus,
    /// Executor for automatic transitions.
    pub executor: Arc<BoundedExecutor>,
    /// The watch service on this node.
    pub service: Arc<SimulatedWatchService>,
    /// Lifecycle coordinator for the watch service.
    pub coordinator: Arc<LifecycleCoordinator>,
    /// Operator command entry point.
    pub handler: ServiceCommandHandler,
}

impl SimNode {
    /// Build and start a node. Must be called inside a tokio runtime.
    pub fn new(id: NodeId, config: &LifecycleConfig, start_delay: Duration, stop_delay: Duration) -> Self {
        let bus = ClusterEventBus::new(id.clone());
        let executor = Arc::new(BoundedExecutor::current(&config.executor));
        let service = Arc::new(SimulatedWatchService::new(id.clone(), start_delay, stop_delay));
        let coordinator = Arc::new(LifecycleCoordinator::new(
            config,
            id.clone(),
            service.clone(),
            executor.clone(),
        ));

        // Wire only once the coordinator is fully built.
        coordinator.register(&bus);
        bus.start();

        let handler = ServiceCommandHandler::new(coordinator.clone());

        Self {
            id,
            bus,
            executor,
            service,
            coordinator,
            handler,
        }
    }

    /// Whether the watch service runs here.
    pub fn is_running(&self) -> bool {
        self.service.state() == ServiceState::Started
    }
}

/// A cluster whose master and recovery state the simulation controls.
pub struct SimulatedCluster {
    nodes: Vec<SimNode>,
    version: u64,
    master: Option<usize>,
    recovered: bool,
}

impl SimulatedCluster {
    /// Create `node_count` nodes with no master and unrecovered state.
    /// Nodes are named after `config.node_name` (default `node`) with a
    /// numeric suffix.
    pub fn new(
        node_count: usize,
        config: &LifecycleConfig,
        start_delay: Duration,
        stop_delay: Duration,
    ) -> Self {
        let prefix = config.node_name.as_deref().unwrap_or("node");
        let nodes = (0..node_count)
            .map(|i| {
                let id = NodeId::new(format!("{}-{}", prefix, i + 1));
                SimNode::new(id, config, start_delay, stop_delay)
            })
            .collect();

        Self {
            nodes,
            version: 0,
            master: None,
            recovered: false,
        }
    }

    /// All nodes.
    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    /// Look up a node by index.
    pub fn node(&self, index: usize) -> Option<&SimNode> {
        self.nodes.get(index)
    }

    /// Index of the current master.
    pub fn master(&self) -> Option<usize> {
        self.master
    }

    /// Current cluster state version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Elect a master (or none) and publish the change.
    pub fn elect(&mut self, master: Option<usize>) -> anyhow::Result<()> {
        if let Some(index) = master {
            if index >= self.nodes.len() {
                anyhow::bail!("no node at index {index}");
            }
        }
        self.master = master;
        info!(master = ?master.map(|i| &self.nodes[i].id), "master elected");
        self.publish()
    }

    /// Set whether persisted state has been recovered and publish.
    pub fn set_recovered(&mut self, recovered: bool) -> anyhow::Result<()> {
        self.recovered = recovered;
        self.publish()
    }

    /// Publish the current view to every node under a new version.
    pub fn publish(&mut self) -> anyhow::Result<()> {
        self.version += 1;
        let master = self.master.map(|i| self.nodes[i].id.clone());

        for node in &self.nodes {
            let mut snapshot =
                ClusterSnapshot::new(self.version, node.id.clone()).with_master(master.clone());
            if !self.recovered {
                snapshot = snapshot.with_block(ClusterBlock::StateNotRecovered);
            }
            node.bus.publish(snapshot)?;
        }
        Ok(())
    }

    /// Wait until every node has processed the latest version and finished
    /// the transitions it forked.
    pub async fn settle(&self) {
        for node in &self.nodes {
            node.bus.wait_for_version(self.version).await;
            node.executor.wait_idle().await;
        }
    }

    /// Send an operator command to the master node.
    pub async fn command(&self, request: &ServiceRequest) -> Result<ServiceResponse, WatcherError> {
        let Some(master) = self.master.and_then(|i| self.nodes.get(i)) else {
            return Err(WatcherError::InternalError("no master to route command to".to_string()));
        };
        master.handler.handle(request).await
    }

    /// Indices of nodes whose watch service is running.
    pub fn running_nodes(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_running())
            .map(|(i, _)| i)
            .collect()
    }

    /// Sum of coordinator metrics across nodes.
    pub fn coordinator_metrics(&self) -> MetricsSnapshot {
        self.nodes
            .iter()
            .map(|node| node.coordinator.metrics().snapshot())
            .fold(MetricsSnapshot::default(), |mut acc, m| {
                acc.events_received += m.events_received;
                acc.transitions_forked += m.transitions_forked;
                acc.transitions_rejected += m.transitions_rejected;
                acc.transitions_skipped += m.transitions_skipped;
                acc.start_attempts += m.start_attempts;
                acc.starts_succeeded += m.starts_succeeded;
                acc.starts_failed += m.starts_failed;
                acc.stop_attempts += m.stop_attempts;
                acc.manual_requests += m.manual_requests;
                acc
            })
    }

    /// Stop every node: closes the executor, stops event dispatch and runs
    /// the coordinator's shutdown hook, then waits out forked transitions.
    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.executor.shutdown();
            node.bus.stop().await;
            node.executor.wait_idle().await;
            if node.is_running() {
                warn!(node = %node.id, "watch service still running after shutdown");
            }
        }
    }
}
