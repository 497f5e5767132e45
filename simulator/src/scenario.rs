//! Simulation scenarios.

use serde::{Deserialize, Serialize};

use watchkeeper_common::ServiceCommand;

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Number of nodes the scenario needs.
    pub nodes: usize,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Wait for a duration.
    Wait { millis: u64 },
    /// Elect a node as master, or leave the cluster without one.
    ElectMaster { node: Option<usize> },
    /// Mark persisted cluster state as recovered or not.
    SetRecovered { recovered: bool },
    /// Send an operator command to the master.
    Command { command: ServiceCommand },
    /// Inject a fault.
    InjectFault { fault_type: FaultType, node: usize },
    /// Clear all faults on a node.
    ClearFault { node: usize },
    /// Assert a condition once the cluster has settled.
    Assert { condition: AssertCondition },
}

/// Types of faults that can be injected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FaultType {
    /// Watch service start fails.
    StartFailure,
    /// Watch index is missing, so validation fails.
    IndexMissing,
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssertCondition {
    /// Exactly this node runs the watch service, or none does.
    RunningOn { node: Option<usize> },
    /// A node's coordinator remembers (or not) an operator stop.
    ManuallyStopped { node: usize, expected: bool },
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "failover" => Ok(Self::failover()),
            "manual-stop" => Ok(Self::manual_stop()),
            "recovery-block" => Ok(Self::recovery_block()),
            "start-failure" => Ok(Self::start_failure()),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Names accepted by [`Scenario::load`].
    pub fn names() -> &'static [&'static str] {
        &["failover", "manual-stop", "recovery-block", "start-failure"]
    }

    /// Master moves between nodes; the service follows it.
    fn failover() -> Self {
        Self {
            name: "failover".to_string(),
            description: "Watch service follows the elected master".to_string(),
            nodes: 3,
            steps: vec![
                ScenarioStep::SetRecovered { recovered: true },
                ScenarioStep::ElectMaster { node: Some(0) },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: Some(0) },
                },
                ScenarioStep::ElectMaster { node: None },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: None },
                },
                ScenarioStep::ElectMaster { node: Some(1) },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: Some(1) },
                },
                ScenarioStep::ElectMaster { node: Some(2) },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: Some(2) },
                },
            ],
        }
    }

    /// An operator stop holds across re-elections on the same node.
    fn manual_stop() -> Self {
        Self {
            name: "manual-stop".to_string(),
            description: "Operator stop survives cluster churn until an operator start".to_string(),
            nodes: 2,
            steps: vec![
                ScenarioStep::SetRecovered { recovered: true },
                ScenarioStep::ElectMaster { node: Some(0) },
                ScenarioStep::Command {
                    command: ServiceCommand::Stop,
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ManuallyStopped {
                        node: 0,
                        expected: true,
                    },
                },
                // Another cluster change with the same master must not restart it.
                ScenarioStep::SetRecovered { recovered: true },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: None },
                },
                ScenarioStep::Command {
                    command: ServiceCommand::Start,
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: Some(0) },
                },
                ScenarioStep::Command {
                    command: ServiceCommand::Restart,
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: Some(0) },
                },
            ],
        }
    }

    /// Nothing starts before persisted state is recovered.
    fn recovery_block() -> Self {
        Self {
            name: "recovery-block".to_string(),
            description: "Master waits for state recovery before starting".to_string(),
            nodes: 2,
            steps: vec![
                ScenarioStep::ElectMaster { node: Some(1) },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: None },
                },
                ScenarioStep::SetRecovered { recovered: true },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: Some(1) },
                },
            ],
        }
    }

    /// A failed start is retried on the next cluster change.
    fn start_failure() -> Self {
        Self {
            name: "start-failure".to_string(),
            description: "Start failures are logged and retried on the next event".to_string(),
            nodes: 2,
            steps: vec![
                ScenarioStep::InjectFault {
                    fault_type: FaultType::StartFailure,
                    node: 0,
                },
                ScenarioStep::SetRecovered { recovered: true },
                ScenarioStep::ElectMaster { node: Some(0) },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: None },
                },
                ScenarioStep::ClearFault { node: 0 },
                ScenarioStep::Wait { millis: 10 },
                ScenarioStep::SetRecovered { recovered: true },
                ScenarioStep::Assert {
                    condition: AssertCondition::RunningOn { node: Some(0) },
                },
            ],
        }
    }
}
