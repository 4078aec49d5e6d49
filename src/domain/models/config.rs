//! Run configuration: sweep shape, shutdown timeouts, workloads.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::budget::MEGABYTE;
use super::timeouts::ExitTimeouts;

/// Main configuration structure for memsweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Memory-budget sweep parameters
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Graduated-shutdown timeout ladder, in seconds
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Workloads to sweep, in order
    #[serde(default = "default_workloads")]
    pub workloads: Vec<WorkloadConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep: SweepConfig::default(),
            timeouts: TimeoutsConfig::default(),
            workloads: default_workloads(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Sweep shape: where the budget ladder starts and how fast it shrinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SweepConfig {
    /// First constrained budget, in bytes
    #[serde(default = "default_start_budget")]
    pub start_budget: u64,

    /// Geometric decay rate, expected in (0, 1)
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,

    /// Number of sweep steps, including the unconstrained first step
    #[serde(default = "default_steps")]
    pub steps: usize,

    /// Repeated samples per budget
    #[serde(default = "default_samples")]
    pub samples: usize,
}

const fn default_start_budget() -> u64 {
    2000 * MEGABYTE
}

const fn default_decay_rate() -> f64 {
    0.9
}

const fn default_steps() -> usize {
    50
}

const fn default_samples() -> usize {
    15
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_budget: default_start_budget(),
            decay_rate: default_decay_rate(),
            steps: default_steps(),
            samples: default_samples(),
        }
    }
}

/// Shutdown timeouts in whole seconds; a missing value disables that tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutsConfig {
    #[serde(default = "default_warn_secs")]
    pub warn_secs: Option<u64>,
    #[serde(default = "default_term_secs")]
    pub term_secs: Option<u64>,
    #[serde(default = "default_abort_secs")]
    pub abort_secs: Option<u64>,
    #[serde(default = "default_kill_secs")]
    pub kill_secs: Option<u64>,
}

const fn default_warn_secs() -> Option<u64> {
    Some(20)
}

const fn default_term_secs() -> Option<u64> {
    Some(30)
}

const fn default_abort_secs() -> Option<u64> {
    Some(40)
}

const fn default_kill_secs() -> Option<u64> {
    Some(50)
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            warn_secs: default_warn_secs(),
            term_secs: default_term_secs(),
            abort_secs: default_abort_secs(),
            kill_secs: default_kill_secs(),
        }
    }
}

impl TimeoutsConfig {
    pub fn to_exit_timeouts(&self) -> ExitTimeouts {
        ExitTimeouts {
            warn: self.warn_secs.map(Duration::from_secs),
            term: self.term_secs.map(Duration::from_secs),
            abort: self.abort_secs.map(Duration::from_secs),
            kill: self.kill_secs.map(Duration::from_secs),
        }
    }
}

/// One application workload in the sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkloadConfig {
    /// Name, used for the workload directory and aggregate artifact names
    pub name: String,

    /// Launch command; wrapped with the memory-limiting launcher when a
    /// budget is set
    pub command: Vec<String>,

    /// Process-name pattern the monitor pins to (pgrep syntax)
    pub pattern: String,

    /// How long the scripted interaction is given to settle, in seconds
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,

    /// Override the sweep's starting budget for this workload
    #[serde(default)]
    pub start_budget: Option<u64>,
}

const fn default_settle_secs() -> u64 {
    30
}

fn default_workloads() -> Vec<WorkloadConfig> {
    vec![]
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
