//! Watchkeeper Coordinator
//!
//! The lifecycle coordinator decides when the watch service runs. It starts
//! the service when this node becomes master of a recovered cluster, stops
//! it when mastership is lost, and remembers an operator's stop so that
//! cluster churn does not start the service again behind their back.

pub mod admin;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod metrics;
pub mod service;

pub use admin::ServiceCommandHandler;
pub use cluster::{ClusterChangedEvent, ClusterEventBus, ClusterStateListener, LifecycleListener};
pub use config::{ExecutorConfig, LifecycleConfig};
pub use coordinator::LifecycleCoordinator;
pub use executor::{BackgroundExecutor, BoundedExecutor, TransitionTask};
pub use metrics::{LifecycleMetrics, MetricsSnapshot};
pub use service::ManagedService;
