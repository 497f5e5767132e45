//! Error types for Watchkeeper.

use crate::NodeId;
use thiserror::Error;

/// Main error type for Watchkeeper operations.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The managed service failed to start.
    #[error("Failed to start watch service: {0}")]
    StartFailed(String),

    /// An administrative command reached a node that is not the master.
    #[error("Node {local} is not the coordinating node (master: {master:?})")]
    NotCoordinatingNode {
        local: NodeId,
        master: Option<NodeId>,
    },

    /// Invalid administrative request.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Unknown administrative command name.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The background executor no longer accepts work.
    #[error("Background executor is shut down")]
    ExecutorShutdown,

    /// Internal error.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WatcherError {
    /// Check if this error is expected to clear on a later cluster event.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WatcherError::StartFailed(_) | WatcherError::NotCoordinatingNode { .. }
        )
    }

    /// Get error code for administrative responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            WatcherError::StartFailed(_) => "START_FAILED",
            WatcherError::NotCoordinatingNode { .. } => "NOT_COORDINATING_NODE",
            WatcherError::InvalidRequest { .. } => "INVALID_REQUEST",
            WatcherError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            WatcherError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            WatcherError::ExecutorShutdown => "EXECUTOR_SHUTDOWN",
            WatcherError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for Watchkeeper operations.
pub type Result<T> = std::result::Result<T, WatcherError>;
