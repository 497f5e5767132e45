//! Simulation controller.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tracing::{info, warn};

use watchkeeper_common::{ServiceCommand, ServiceRequest};
use watchkeeper_coordinator::LifecycleConfig;

use crate::cluster::SimulatedCluster;
use crate::metrics::SimulationMetrics;
use crate::scenario::{AssertCondition, FaultType, Scenario, ScenarioStep};

/// Controls the simulation.
pub struct SimulationController {
    /// Number of nodes.
    node_count: usize,
    /// Simulation speed multiplier.
    speed: f64,
    /// Coordinator configuration used on every node.
    config: LifecycleConfig,
    /// Random number generator.
    rng: StdRng,
    /// Simulated cluster.
    cluster: Arc<RwLock<Option<SimulatedCluster>>>,
    /// Simulation metrics.
    metrics: SimulationMetrics,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(node_count: usize, speed: f64, seed: Option<u64>, config: LifecycleConfig) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            node_count,
            speed,
            config,
            rng,
            cluster: Arc::new(RwLock::new(None)),
            metrics: SimulationMetrics::new(),
        }
    }

    /// Initialize the simulated cluster.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        if self.node_count == 0 {
            anyhow::bail!("simulation needs at least one node");
        }
        info!("Initializing simulation with {} nodes", self.node_count);

        let cluster = SimulatedCluster::new(
            self.node_count,
            &self.config,
            self.scaled(Duration::from_millis(200)),
            self.scaled(Duration::from_millis(300)),
        );
        *self.cluster.write().await = Some(cluster);

        Ok(())
    }

    /// Run a scenario. Fails on the first assertion that does not hold.
    pub async fn run_scenario(&mut self, scenario: Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        if scenario.nodes > self.node_count {
            anyhow::bail!(
                "scenario {} needs {} nodes, simulation has {}",
                scenario.name,
                scenario.nodes,
                self.node_count
            );
        }

        for step in &scenario.steps {
            self.execute_step(step).await?;
        }

        Ok(())
    }

    /// Run in continuous mode: random master churn and operator commands.
    pub async fn run(&mut self, duration: Option<Duration>) -> anyhow::Result<()> {
        info!("Running simulation in continuous mode");

        {
            let mut guard = self.cluster.write().await;
            let cluster = guard.as_mut().ok_or_else(|| anyhow::anyhow!("simulation not initialized"))?;
            cluster.set_recovered(true)?;
        }

        let deadline = duration.map(|d| tokio::time::Instant::now() + d);
        let interval = self.scaled(Duration::from_millis(500));

        loop {
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
            }

            self.random_step().await?;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn random_step(&mut self) -> anyhow::Result<()> {
        let roll: u32 = self.rng.gen_range(0..10);
        let step = if roll < 7 {
            // Mostly elections, sometimes leaving the cluster leaderless
            let node = if self.rng.gen_bool(0.15) {
                None
            } else {
                Some(self.rng.gen_range(0..self.node_count))
            };
            ScenarioStep::ElectMaster { node }
        } else {
            let command = match self.rng.gen_range(0..3) {
                0 => ServiceCommand::Start,
                1 => ServiceCommand::Stop,
                _ => ServiceCommand::Restart,
            };
            ScenarioStep::Command { command }
        };

        self.execute_step(&step).await
    }

    /// Execute a single scenario step.
    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        let mut guard = self.cluster.write().await;
        let cluster = guard.as_mut().ok_or_else(|| anyhow::anyhow!("simulation not initialized"))?;

        match step {
            ScenarioStep::Wait { millis } => {
                let adjusted = self.scaled(Duration::from_millis(*millis));
                info!("Waiting {}ms (adjusted: {:?})", millis, adjusted);
                tokio::time::sleep(adjusted).await;
            }
            ScenarioStep::ElectMaster { node } => {
                cluster.elect(*node)?;
                self.metrics.record_election();
                cluster.settle().await;
                self.metrics.record_settled(cluster.running_nodes().len());
            }
            ScenarioStep::SetRecovered { recovered } => {
                cluster.set_recovered(*recovered)?;
                cluster.settle().await;
                self.metrics.record_settled(cluster.running_nodes().len());
            }
            ScenarioStep::Command { command } => {
                let request = ServiceRequest {
                    command: Some(*command),
                };
                match cluster.command(&request).await {
                    Ok(response) => {
                        info!("Command {} acknowledged, service {}", command, response.state);
                        self.metrics.record_command(true);
                    }
                    Err(e) => {
                        warn!("Command {} rejected: {}", command, e);
                        self.metrics.record_command(false);
                    }
                }
                cluster.settle().await;
                self.metrics.record_settled(cluster.running_nodes().len());
            }
            ScenarioStep::InjectFault { fault_type, node } => {
                let target = cluster
                    .node(*node)
                    .ok_or_else(|| anyhow::anyhow!("no node at index {node}"))?;
                info!("Injecting fault {:?} on {}", fault_type, target.id);
                match fault_type {
                    FaultType::StartFailure => target.service.set_fail_start(true),
                    FaultType::IndexMissing => target.service.set_index_missing(true),
                }
            }
            ScenarioStep::ClearFault { node } => {
                let target = cluster
                    .node(*node)
                    .ok_or_else(|| anyhow::anyhow!("no node at index {node}"))?;
                info!("Clearing faults on {}", target.id);
                target.service.set_fail_start(false);
                target.service.set_index_missing(false);
            }
            ScenarioStep::Assert { condition } => {
                cluster.settle().await;
                let passed = Self::check(cluster, condition);
                self.metrics.record_assertion(passed);
                if !passed {
                    anyhow::bail!(
                        "assertion {:?} failed, running on {:?}",
                        condition,
                        cluster.running_nodes()
                    );
                }
                info!("Assertion held: {:?}", condition);
            }
        }

        Ok(())
    }

    fn check(cluster: &SimulatedCluster, condition: &AssertCondition) -> bool {
        match condition {
            AssertCondition::RunningOn { node } => {
                let running = cluster.running_nodes();
                match node {
                    Some(index) => running == vec![*index],
                    None => running.is_empty(),
                }
            }
            AssertCondition::ManuallyStopped { node, expected } => cluster
                .node(*node)
                .map(|n| n.coordinator.is_manually_stopped() == *expected)
                .unwrap_or(false),
        }
    }

    fn scaled(&self, duration: Duration) -> Duration {
        duration.div_f64(self.speed.max(0.01))
    }

    /// Get simulation metrics.
    pub fn get_metrics(&self) -> SimulationMetrics {
        self.metrics.clone()
    }

    /// Log coordinator counters and stop every node.
    pub async fn shutdown(&mut self) {
        let guard = self.cluster.read().await;
        let Some(cluster) = guard.as_ref() else {
            return;
        };

        let totals = cluster.coordinator_metrics();
        info!(
            events = totals.events_received,
            forked = totals.transitions_forked,
            skipped = totals.transitions_skipped,
            starts = totals.starts_succeeded,
            start_failures = totals.starts_failed,
            stops = totals.stop_attempts,
            "Coordinator totals"
        );
        for node in cluster.nodes() {
            info!(
                node = %node.id,
                starts = node.service.start_count(),
                stops = node.service.stop_count(),
                "Watch service history"
            );
        }

        cluster.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn controller(nodes: usize) -> SimulationController {
        let mut controller =
            SimulationController::new(nodes, 100.0, Some(7), LifecycleConfig::default());
        controller.initialize().await.unwrap();
        controller
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_named_scenarios_pass() {
        for name in Scenario::names() {
            let mut controller = controller(3).await;
            controller.run_scenario(Scenario::load(name).unwrap()).await.unwrap();
            assert!(controller.get_metrics().is_clean(), "scenario {name}");
            controller.shutdown().await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_random_churn_never_runs_twice() {
        let mut controller = controller(3).await;
        controller
            .run(Some(Duration::from_millis(200)))
            .await
            .unwrap();

        let metrics = controller.get_metrics();
        assert_eq!(metrics.split_runs, 0);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_scenario_needs_enough_nodes() {
        let mut controller = controller(1).await;
        assert!(controller
            .run_scenario(Scenario::load("failover").unwrap())
            .await
            .is_err());
    }
}
