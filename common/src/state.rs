//! Watch service state definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state reported by the managed watch service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Not running; the only state a start may begin from.
    Stopped,
    /// Start in progress.
    Starting,
    /// Running; the only state a stop may begin from.
    Started,
    /// Stop in progress.
    Stopping,
}

impl ServiceState {
    /// Check if the service is fully running.
    pub fn is_started(&self) -> bool {
        matches!(self, ServiceState::Started)
    }

    /// Check if the service is fully stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, ServiceState::Stopped)
    }

    /// Lowercase name used in logs and responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Started => "started",
            ServiceState::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(ServiceState::Started.is_started());
        assert!(ServiceState::Stopped.is_stopped());
        assert!(!ServiceState::Starting.is_started());
        assert!(!ServiceState::Stopping.is_stopped());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ServiceState::Started).unwrap();
        assert_eq!(json, "\"started\"");
        assert_eq!(ServiceState::Stopping.to_string(), "stopping");
    }
}
