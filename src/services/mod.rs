//! Service layer: the scope tree, process supervision, and the sweep
//! driver.

pub mod context;
pub mod interrupt;
pub mod process;
pub mod runner;
pub mod scope_log;

pub use context::{ContextNode, ContextRole};
pub use interrupt::InterruptWatcher;
pub use process::ManagedProcess;
pub use runner::{AppWorkload, ExperimentRunner, WorkloadDriver, GRAPHS_ALL_DIR};
pub use scope_log::ScopeLogger;
