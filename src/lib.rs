//! Memsweep - memory-budget sweep runner
//!
//! Memsweep automates repeated, memory-constrained runs of desktop and
//! browser applications. While a scripted interaction executes, an external
//! sampler records memory usage; each run leaves logs, screenshots, memory
//! graphs and timing data under a structured directory hierarchy, with one
//! branch per workload, memory budget, and sample.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): budgets, decay sequences, process states,
//!   timeouts, configuration models, the error taxonomy
//! - **Service Layer** (`services`): the context-scope tree, process
//!   supervision with graduated shutdown, the sweep driver
//! - **Infrastructure Layer** (`infrastructure`): the memory-limiting
//!   launcher, the sampling monitor, screenshot capture, config loading
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use memsweep::{ConfigLoader, ExperimentRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     ExperimentRunner::new(config).run("out".as_ref()).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ExperimentError, ExperimentResult};
pub use domain::models::{
    decay, Config, ExitTimeouts, MemoryBudget, ProcessState, SweepConfig, TimeoutsConfig,
    WorkloadConfig, MEGABYTE,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::launcher::{
    assert_not_running, DirectLauncher, MemoryLauncher, SystemdRunLauncher,
};
pub use infrastructure::monitor::MonitorSession;
pub use infrastructure::screen::{CommandScreenCapture, NoopScreen, ScreenCapture};
pub use services::{
    AppWorkload, ContextNode, ContextRole, ExperimentRunner, InterruptWatcher, ManagedProcess,
    ScopeLogger, WorkloadDriver,
};
