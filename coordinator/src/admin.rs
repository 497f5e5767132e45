//! Operator start/stop/restart commands.

use std::sync::Arc;

use tracing::{info, instrument};

use watchkeeper_common::{Result, ServiceCommand, ServiceRequest, ServiceResponse, WatcherError};

use crate::coordinator::LifecycleCoordinator;

/// Executes [`ServiceRequest`]s against the coordinator of the master node.
pub struct ServiceCommandHandler {
    coordinator: Arc<LifecycleCoordinator>,
}

impl ServiceCommandHandler {
    /// Create a handler for the given coordinator.
    pub fn new(coordinator: Arc<LifecycleCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Validate and run a request.
    ///
    /// Rejected unless this node is master in the latest snapshot it has
    /// seen. A restart is a stop followed by a separate start; each takes
    /// the coordinator's transition lock on its own.
    #[instrument(skip(self, request), fields(command = ?request.command))]
    pub async fn handle(&self, request: &ServiceRequest) -> Result<ServiceResponse> {
        let command = request.validate()?;

        let snapshot = self.coordinator.last_snapshot();
        if !snapshot.is_local_node_master() {
            return Err(WatcherError::NotCoordinatingNode {
                local: snapshot.local_node.clone(),
                master: snapshot.master_node.clone(),
            });
        }

        info!(%command, version = snapshot.version, "Executing watch service command");
        match command {
            ServiceCommand::Start => self.coordinator.start().await,
            ServiceCommand::Stop => self.coordinator.stop().await,
            ServiceCommand::Restart => {
                self.coordinator.stop().await;
                self.coordinator.start().await;
            }
        }

        Ok(ServiceResponse {
            command,
            acknowledged: true,
            state: self.coordinator.service_state(),
        })
    }
}
