//! Lifecycle states for an externally memory-constrained application
//! process under graduated shutdown.

use serde::{Deserialize, Serialize};

/// Where a supervised process is in the terminate -> abort-all -> kill
/// escalation ladder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Launched and not yet asked to exit.
    #[default]
    Running,
    /// SIGTERM was sent to the primary process.
    TerminationRequested,
    /// SIGABRT was sent to the whole process group.
    AbortRequested,
    /// SIGKILL was sent to the whole process group.
    Killed,
    /// The process exited on its own (possibly after a signal).
    Exited,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::TerminationRequested => "termination_requested",
            Self::AbortRequested => "abort_requested",
            Self::Killed => "killed",
            Self::Exited => "exited",
        }
    }

    /// Killed and Exited are both terminal; Killed records that force was
    /// required, Exited that the process left on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Killed | Self::Exited)
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(&self) -> Vec<ProcessState> {
        match self {
            Self::Running => vec![Self::TerminationRequested, Self::Exited],
            Self::TerminationRequested => vec![Self::AbortRequested, Self::Killed, Self::Exited],
            Self::AbortRequested => vec![Self::Killed, Self::Exited],
            Self::Killed => vec![],
            Self::Exited => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_ordering() {
        assert!(ProcessState::Running.can_transition_to(ProcessState::TerminationRequested));
        assert!(
            ProcessState::TerminationRequested.can_transition_to(ProcessState::AbortRequested)
        );
        assert!(ProcessState::AbortRequested.can_transition_to(ProcessState::Killed));
        // No skipping backwards
        assert!(!ProcessState::AbortRequested.can_transition_to(ProcessState::TerminationRequested));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProcessState::Killed.is_terminal());
        assert!(ProcessState::Exited.is_terminal());
        assert!(!ProcessState::TerminationRequested.is_terminal());
        assert!(ProcessState::Killed.valid_transitions().is_empty());
    }
}
