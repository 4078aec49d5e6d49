use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid decay_rate: {0}. Must be in (0, 1)")]
    InvalidDecayRate(f64),

    #[error("Invalid samples: {0}. Must be at least 1")]
    InvalidSamples(usize),

    #[error("Invalid start_budget: must be positive")]
    InvalidStartBudget,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Workload `{0}` has an empty launch command")]
    EmptyWorkloadCommand(String),

    #[error("Workload `{0}` has an empty process pattern")]
    EmptyWorkloadPattern(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. memsweep.yaml in the working directory
    /// 3. Environment variables (`MEMSWEEP_*` prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("memsweep.yaml"))
            .merge(Env::prefixed("MEMSWEEP_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("MEMSWEEP_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.sweep.decay_rate <= 0.0 || config.sweep.decay_rate >= 1.0 {
            return Err(ConfigError::InvalidDecayRate(config.sweep.decay_rate));
        }

        if config.sweep.samples == 0 {
            return Err(ConfigError::InvalidSamples(config.sweep.samples));
        }

        if config.sweep.steps > 0 && config.sweep.start_budget == 0 {
            return Err(ConfigError::InvalidStartBudget);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        for workload in &config.workloads {
            if workload.command.is_empty() {
                return Err(ConfigError::EmptyWorkloadCommand(workload.name.clone()));
            }
            if workload.pattern.is_empty() {
                return Err(ConfigError::EmptyWorkloadPattern(workload.name.clone()));
            }
        }

        Ok(())
    }
}
