//! Simulation metrics.

use serde::Serialize;

/// Simulation metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationMetrics {
    /// Master elections published.
    pub elections: u64,
    /// Operator commands sent.
    pub commands: u64,
    /// Operator commands the master refused.
    pub commands_rejected: u64,
    /// Assertions that held.
    pub assertions_passed: u64,
    /// Assertions that did not hold.
    pub assertions_failed: u64,
    /// Settled states in which more than one node ran the watch service.
    pub split_runs: u64,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a published election.
    pub fn record_election(&mut self) {
        self.elections += 1;
    }

    /// Record an operator command and whether it was accepted.
    pub fn record_command(&mut self, accepted: bool) {
        self.commands += 1;
        if !accepted {
            self.commands_rejected += 1;
        }
    }

    /// Record an assertion outcome.
    pub fn record_assertion(&mut self, passed: bool) {
        if passed {
            self.assertions_passed += 1;
        } else {
            self.assertions_failed += 1;
        }
    }

    /// Record how many nodes ran the service in a settled state.
    pub fn record_settled(&mut self, running: usize) {
        if running > 1 {
            self.split_runs += 1;
        }
    }

    /// Whether nothing went wrong.
    pub fn is_clean(&self) -> bool {
        self.assertions_failed == 0 && self.split_runs == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_election();
        metrics.record_command(true);
        metrics.record_command(false);
        metrics.record_assertion(true);
        metrics.record_settled(1);

        assert_eq!(metrics.elections, 1);
        assert_eq!(metrics.commands, 2);
        assert_eq!(metrics.commands_rejected, 1);
        assert!(metrics.is_clean());

        metrics.record_settled(2);
        assert!(!metrics.is_clean());
    }
}
