//! Domain models: budgets, process states, timeouts, configuration.

pub mod budget;
pub mod config;
pub mod process_state;
pub mod timeouts;

pub use budget::{decay, MemoryBudget, MEGABYTE};
pub use config::{Config, LoggingConfig, SweepConfig, TimeoutsConfig, WorkloadConfig};
pub use process_state::ProcessState;
pub use timeouts::ExitTimeouts;
