//! Shutdown timeout ladder for supervised application processes.

use std::time::Duration;

/// Timeouts bounding the graduated shutdown, all measured from the moment
/// the termination request is sent. Each tier is independently optional;
/// `None` disables that escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitTimeouts {
    /// Informational threshold. If the final exit duration exceeds it, the
    /// sweep driver is told not to tighten the budget for this workload.
    pub warn: Option<Duration>,
    /// Past this, capture a diagnostic screenshot and log a warning.
    pub term: Option<Duration>,
    /// Past this, capture a screenshot and SIGABRT the whole process group.
    pub abort: Option<Duration>,
    /// Past this, SIGKILL the whole process group.
    pub kill: Option<Duration>,
}

impl Default for ExitTimeouts {
    fn default() -> Self {
        Self {
            warn: Some(Duration::from_secs(20)),
            term: Some(Duration::from_secs(30)),
            abort: Some(Duration::from_secs(40)),
            kill: Some(Duration::from_secs(50)),
        }
    }
}

impl ExitTimeouts {
    /// Ladder with every tier firing immediately. Test helper for forcing
    /// the full escalation without waiting.
    pub fn immediate() -> Self {
        Self {
            warn: Some(Duration::ZERO),
            term: Some(Duration::ZERO),
            abort: Some(Duration::ZERO),
            kill: Some(Duration::ZERO),
        }
    }

    /// Ladder that never escalates; only natural exit ends the wait.
    pub fn never() -> Self {
        Self {
            warn: None,
            term: None,
            abort: None,
            kill: None,
        }
    }
}
