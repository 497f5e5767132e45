//! Contract for the service whose lifecycle is coordinated.

use async_trait::async_trait;

use watchkeeper_common::{ClusterSnapshot, Result, ServiceState};

/// A long-running background service that is started and stopped as the
/// local node gains or loses the master role.
///
/// The coordinator only ever interacts with the service through this
/// trait, and never calls `start` or `stop` concurrently on one instance.
#[async_trait]
pub trait ManagedService: Send + Sync + 'static {
    /// Current lifecycle state. Must be cheap and must not block.
    fn state(&self) -> ServiceState;

    /// Whether the cluster is in a shape the service can run against.
    /// Returning `false` is expected while the cluster settles.
    fn validate(&self, snapshot: &ClusterSnapshot) -> bool;

    /// Start the service against the given cluster snapshot.
    async fn start(&self, snapshot: &ClusterSnapshot) -> Result<()>;

    /// Stop the service, returning only once it has fully shut down.
    async fn stop(&self);
}
