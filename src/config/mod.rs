//! # Orchestrator Configuration
//!
//! Every section carries defaults, so an empty configuration is a valid one.
//! Values are layered by [`ConfigLoader`]: built-in defaults for the selected
//! environment, then an optional TOML file, then `HPCFLOW__SECTION__KEY`
//! environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hpcflow_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_file("config/hpcflow.toml")
//!     .load()?;
//!
//! let retries = config.orchestration.max_task_retries;
//! let poll = config.monitor.poll_interval();
//! # let _ = (retries, poll);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Deployment environment selecting the default profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigurationError::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub environment: Environment,

    /// Process lifecycle settings
    pub orchestration: OrchestrationConfig,

    /// Retry delay calculation
    pub backoff: BackoffConfig,

    /// Task execution settings
    pub execution: ExecutionConfig,

    /// MONITOR polling
    pub monitor: MonitorConfig,

    /// Execution adaptor pool and SSH backend
    pub adaptors: AdaptorConfig,

    /// Status publisher channels
    pub events: EventsConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Retries allowed after the first attempt of a task
    pub max_task_retries: u32,
    /// How long a CANCELING process waits for the in-flight task to acknowledge
    pub cancel_timeout_seconds: u64,
    /// Capacity of the task result channels feeding the orchestrator
    pub result_channel_capacity: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_task_retries: 3,
            cancel_timeout_seconds: 300,
            result_channel_capacity: 1024,
        }
    }
}

impl OrchestrationConfig {
    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_secs(self.cancel_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_enabled: bool,
    /// Largest jitter as a fraction of the computed delay
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on one execute/recover call (MONITOR uses the job wall time)
    pub task_timeout_seconds: u64,
    /// Upper bound on one remote command
    pub command_timeout_seconds: u64,
    /// Concurrent workers consuming each task-type queue
    pub workers_per_task_type: usize,
    /// Capacity of each task-type dispatch queue
    pub dispatch_queue_capacity: usize,
    /// Local directory job scripts are rendered into before upload
    pub script_directory: PathBuf,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            task_timeout_seconds: 1_800,
            command_timeout_seconds: 120,
            workers_per_task_type: 4,
            dispatch_queue_capacity: 1024,
            script_directory: std::env::temp_dir().join("hpcflow-scripts"),
        }
    }
}

impl ExecutionConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_seconds: u64,
    /// Added to the requested wall time before MONITOR gives up on a
    /// running job
    pub wall_time_grace_seconds: u64,
    /// How long a job may sit in the queue before MONITOR gives up; queue
    /// time does not count against the wall time
    pub max_queue_wait_seconds: u64,
    /// Consecutive "no such job" answers needed to finish a job that was
    /// never observed queued or running
    pub gone_confirmations: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            wall_time_grace_seconds: 600,
            max_queue_wait_seconds: 7 * 24 * 3_600,
            gone_confirmations: 3,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn wall_time_grace(&self) -> Duration {
        Duration::from_secs(self.wall_time_grace_seconds)
    }

    pub fn max_queue_wait(&self) -> Duration {
        Duration::from_secs(self.max_queue_wait_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptorConfig {
    /// Concurrent commands allowed against one compute resource
    pub max_concurrent_commands_per_resource: usize,
    pub connect_timeout_seconds: u64,
    pub ssh_binary: String,
    pub scp_binary: String,
    /// Directory holding SSH control-master sockets
    pub control_directory: PathBuf,
    pub control_persist_seconds: u64,
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_commands_per_resource: 8,
            connect_timeout_seconds: 30,
            ssh_binary: "ssh".to_string(),
            scp_binary: "scp".to_string(),
            control_directory: std::env::temp_dir().join("hpcflow-ssh"),
            control_persist_seconds: 600,
        }
    }
}

impl AdaptorConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
    /// Mirror every status event into the log
    pub log_status_events: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            log_status_events: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl OrchestratorConfig {
    /// Built-in defaults for an environment
    pub fn for_environment(environment: Environment) -> Self {
        let mut config = Self {
            environment,
            ..Self::default()
        };
        match environment {
            Environment::Development => {
                config.logging.level = "debug".to_string();
            }
            Environment::Test => {
                config.backoff.base_delay_ms = 0;
                config.backoff.jitter_enabled = false;
                config.monitor.poll_interval_seconds = 1;
                config.orchestration.cancel_timeout_seconds = 5;
                config.logging.level = "warn".to_string();
            }
            Environment::Production => {
                config.logging.json = true;
            }
        }
        config
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if self.execution.workers_per_task_type == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.workers_per_task_type",
                0,
                "at least one worker per task type is required",
            ));
        }

        if self.execution.dispatch_queue_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.dispatch_queue_capacity",
                0,
                "queue capacity must be greater than 0",
            ));
        }

        if self.execution.task_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.task_timeout_seconds",
                0,
                "task timeout must be greater than 0",
            ));
        }

        if self.monitor.poll_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitor.poll_interval_seconds",
                0,
                "poll interval must be greater than 0",
            ));
        }

        if self.monitor.gone_confirmations == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitor.gone_confirmations",
                0,
                "at least one confirming answer is required",
            ));
        }

        if self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier,
                "multiplier must be at least 1.0",
            ));
        }

        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_delay_ms",
                self.backoff.max_delay_ms,
                "max delay must not be below base delay",
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.max_jitter) {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_jitter",
                self.backoff.max_jitter,
                "jitter must be a fraction between 0 and 1",
            ));
        }

        if self.adaptors.max_concurrent_commands_per_resource == 0 {
            return Err(ConfigurationError::invalid_value(
                "adaptors.max_concurrent_commands_per_resource",
                0,
                "at least one concurrent command is required",
            ));
        }

        if self.adaptors.ssh_binary.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "adaptors.ssh_binary",
                "adaptor configuration",
            ));
        }

        if self.events.channel_capacity == 0 || self.orchestration.result_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                0,
                "channel capacities must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        for env in [
            Environment::Development,
            Environment::Test,
            Environment::Production,
        ] {
            OrchestratorConfig::for_environment(env).validate().unwrap();
        }
        assert!(OrchestratorConfig::for_environment(Environment::Production).logging.json);
        assert_eq!(
            OrchestratorConfig::for_environment(Environment::Test).backoff.base_delay_ms,
            0
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = OrchestratorConfig::default();
        config.backoff.multiplier = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "backoff.multiplier"
        ));

        let mut config = OrchestratorConfig::default();
        config.execution.workers_per_task_type = 0;
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.backoff.max_jitter = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }
}
