//! Lifecycle coordinator configuration.

use std::collections::HashMap;

use watchkeeper_common::{NodeId, Result, WatcherError};

/// Settings key controlling whether the watch service may start on boot.
pub const START_IMMEDIATELY_SETTING: &str = "watcher.start_immediately";

/// Settings key bounding concurrently running automatic transitions.
pub const EXECUTOR_MAX_CONCURRENT_SETTING: &str = "watcher.executor.max_concurrent";

/// Background executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of transitions running at once.
    pub max_concurrent_transitions: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transitions: 4,
        }
    }
}

/// Main lifecycle configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Start the watch service automatically once this node is master.
    /// When `false` the coordinator begins as if an operator had stopped it.
    pub start_immediately: bool,
    /// Node name (must be unique within cluster).
    pub node_name: Option<String>,
    /// Executor configuration.
    pub executor: ExecutorConfig,
    /// Log level.
    pub log_level: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            start_immediately: true,
            node_name: None,
            executor: ExecutorConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl LifecycleConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a flat settings map keyed like
    /// `watcher.start_immediately`.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = settings.get(START_IMMEDIATELY_SETTING) {
            config.start_immediately = parse_bool(START_IMMEDIATELY_SETTING, value)?;
        }

        if let Some(value) = settings.get(EXECUTOR_MAX_CONCURRENT_SETTING) {
            config.executor.max_concurrent_transitions =
                parse_usize(EXECUTOR_MAX_CONCURRENT_SETTING, value)?;
        }

        if let Some(name) = settings.get("node.name") {
            config.node_name = Some(name.clone());
        }

        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("WATCHER_START_IMMEDIATELY") {
            config.start_immediately = parse_bool("WATCHER_START_IMMEDIATELY", &value)?;
        }

        if let Some(value) = lookup("WATCHER_EXECUTOR_MAX_CONCURRENT") {
            config.executor.max_concurrent_transitions =
                parse_usize("WATCHER_EXECUTOR_MAX_CONCURRENT", &value)?;
        }

        if let Some(name) = lookup("WATCHER_NODE_NAME") {
            config.node_name = Some(name);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.executor.max_concurrent_transitions == 0 {
            return Err(WatcherError::ConfigurationError(
                "Executor must allow at least one concurrent transition".to_string(),
            ));
        }

        if let Some(name) = &self.node_name {
            if !NodeId::new(name.as_str()).is_valid() {
                return Err(WatcherError::ConfigurationError(format!(
                    "Invalid node name: {:?}",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Initial value of the coordinator's manual-stop flag.
    pub fn initially_stopped(&self) -> bool {
        !self.start_immediately
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(WatcherError::ConfigurationError(format!(
            "Failed to parse value [{other}] for [{key}] as a boolean"
        ))),
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        WatcherError::ConfigurationError(format!(
            "Failed to parse value [{value}] for [{key}] as a number"
        ))
    })
}
