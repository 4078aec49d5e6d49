//! Error taxonomy for the memsweep experiment system.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving an experiment.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// An exclusive start was requested but a matching process is already
    /// alive on the system. Recoverable: the caller decides whether to skip
    /// or treat the failed precondition as fatal to the sample.
    #[error("a process matching `{pattern}` is already running")]
    AlreadyRunning { pattern: String },

    /// A process needed longer than the warn threshold to exit during
    /// teardown. The sweep driver must not push this workload to a tighter
    /// memory budget.
    #[error(
        "application took {} s to exit, longer than the {} s warning threshold",
        .exit_duration.as_secs_f64(),
        .warn.as_secs_f64()
    )]
    TookTooLong {
        exit_duration: Duration,
        warn: Duration,
    },

    /// Operator-sent interrupt. A clean exit path: every scope still runs
    /// full teardown, but no diagnostics are captured and nothing is
    /// re-raised as a failure.
    #[error("interrupted by operator")]
    Interrupted,

    /// The application (or its memory-limiting wrapper) failed to spawn.
    #[error("failed to launch `{command}`: {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The sampling subprocess failed to start or stop.
    #[error("monitor failure: {0}")]
    MonitorFailed(String),

    /// Signal delivery to a supervised process failed.
    #[error("signal delivery failed: {0}")]
    SignalFailed(String),

    /// The workload driver hit a condition it classifies as the application
    /// becoming unresponsive (e.g. a UI target never appeared).
    #[error("application unresponsive: {0}")]
    Unresponsive(String),

    /// An external helper tool misbehaved (pgrep, the screen grabber).
    #[error("`{tool}` failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExperimentResult<T> = Result<T, ExperimentError>;

impl From<nix::errno::Errno> for ExperimentError {
    fn from(err: nix::errno::Errno) -> Self {
        Self::SignalFailed(err.to_string())
    }
}

impl ExperimentError {
    /// Whether this error is the operator-interrupt path, which skips
    /// diagnostics during scope exit.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
