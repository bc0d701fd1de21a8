//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources are merged
//! in order, later sources winning:
//!
//! 1. built-in defaults for the environment (`HPCFLOW_ENV`)
//! 2. an optional TOML file
//! 3. `HPCFLOW__<SECTION>__<KEY>` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::{Environment, OrchestratorConfig};
use config::{Config, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable selecting the default profile
pub const ENVIRONMENT_VARIABLE: &str = "HPCFLOW_ENV";

/// Prefix of override variables, e.g. `HPCFLOW__BACKOFF__BASE_DELAY_MS`
pub const ENV_PREFIX: &str = "HPCFLOW";

const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    environment: Option<Environment>,
    env_overrides: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            environment: None,
            env_overrides: true,
        }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use an explicit environment instead of reading `HPCFLOW_ENV`
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Ignore `HPCFLOW__*` variables; useful for tests
    pub fn without_env_overrides(mut self) -> Self {
        self.env_overrides = false;
        self
    }

    /// Environment from `HPCFLOW_ENV`, development when unset
    pub fn detect_environment() -> ConfigResult<Environment> {
        match env::var(ENVIRONMENT_VARIABLE) {
            Ok(value) if !value.trim().is_empty() => value.trim().parse(),
            _ => Ok(Environment::default()),
        }
    }

    /// Merge all sources and validate the result
    pub fn load(&self) -> ConfigResult<OrchestratorConfig> {
        let environment = match self.environment {
            Some(environment) => environment,
            None => Self::detect_environment()?,
        };

        let defaults = Config::try_from(&OrchestratorConfig::for_environment(environment))
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = &self.file {
            if !path.is_file() {
                return Err(ConfigurationError::ConfigFileNotFound(path.clone()));
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        if self.env_overrides {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let source_name = self
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let mut config: OrchestratorConfig = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;
        config.environment = environment;

        config.validate()?;

        debug!(
            environment = %config.environment,
            max_task_retries = config.orchestration.max_task_retries,
            workers_per_task_type = config.execution.workers_per_task_type,
            "Configuration loaded"
        );

        Ok(config)
    }
}
