//! Administrative commands for the watch service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ServiceState, WatcherError};

/// Operator command against the watch service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCommand {
    /// Start the service if not already started.
    Start,
    /// Stop the service if not already stopped.
    Stop,
    /// Stop, then start.
    Restart,
}

impl ServiceCommand {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCommand::Start => "start",
            ServiceCommand::Stop => "stop",
            ServiceCommand::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceCommand {
    type Err = WatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(ServiceCommand::Start),
            "stop" => Ok(ServiceCommand::Stop),
            "restart" => Ok(ServiceCommand::Restart),
            _ => Err(WatcherError::UnknownCommand(s.to_string())),
        }
    }
}

/// Request carrying a single service command to the master node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// The command to execute; `None` until one of the builders is called.
    pub command: Option<ServiceCommand>,
}

impl ServiceRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the watch service if not already started.
    pub fn start(mut self) -> Self {
        self.command = Some(ServiceCommand::Start);
        self
    }

    /// Stops the watch service if not already stopped.
    pub fn stop(mut self) -> Self {
        self.command = Some(ServiceCommand::Stop);
        self
    }

    /// Stops and then starts the watch service.
    pub fn restart(mut self) -> Self {
        self.command = Some(ServiceCommand::Restart);
        self
    }

    /// Validate the request, returning the command it carries.
    pub fn validate(&self) -> Result<ServiceCommand, WatcherError> {
        self.command.ok_or_else(|| WatcherError::InvalidRequest {
            message: "no command specified".to_string(),
        })
    }
}

/// Acknowledgement of an executed service command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// The command that was executed.
    pub command: ServiceCommand,
    /// Always `true` once the command ran to completion.
    pub acknowledged: bool,
    /// Service state observed after the command completed.
    pub state: ServiceState,
}
