//! Memory-limiting launcher seam.
//!
//! The OS-level enforcement is delegated to an external service-manager
//! wrapper: the launcher's only job is to turn a workload command plus a
//! budget into the argv actually spawned. The wrapped command runs in its
//! own cgroup scope whose memory ceiling the OS enforces.

use tokio::process::Command;

use crate::domain::errors::{ExperimentError, ExperimentResult};
use crate::domain::models::MemoryBudget;

/// Builds the argv for launching a workload under a memory budget.
pub trait MemoryLauncher: Send + Sync {
    fn wrap(&self, command: &[String], budget: MemoryBudget) -> Vec<String>;
}

/// Wraps commands with `systemd-run --user --scope -p MemoryHigh=<budget>`.
/// An unconstrained budget maps to `MemoryHigh=infinity`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemdRunLauncher;

impl MemoryLauncher for SystemdRunLauncher {
    fn wrap(&self, command: &[String], budget: MemoryBudget) -> Vec<String> {
        let mut argv = vec![
            "systemd-run".to_string(),
            "--user".to_string(),
            "--scope".to_string(),
            "-p".to_string(),
            format!("MemoryHigh={}", budget.launcher_value()),
        ];
        argv.extend(command.iter().cloned());
        argv
    }
}

/// Launches commands as-is, with no memory ceiling. Used in tests and on
/// hosts without a user service manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectLauncher;

impl MemoryLauncher for DirectLauncher {
    fn wrap(&self, command: &[String], _budget: MemoryBudget) -> Vec<String> {
        command.to_vec()
    }
}

/// Fail with [`ExperimentError::AlreadyRunning`] if any process matching
/// `pattern` is alive. pgrep exit code 1 means "no match"; anything other
/// than 0 or 1 is a tool failure.
pub async fn assert_not_running(pattern: &str) -> ExperimentResult<()> {
    let status = Command::new("pgrep")
        .arg(pattern)
        .stdout(std::process::Stdio::null())
        .status()
        .await?;

    match status.code() {
        Some(0) => Err(ExperimentError::AlreadyRunning {
            pattern: pattern.to_string(),
        }),
        Some(1) => Ok(()),
        other => Err(ExperimentError::ToolFailed {
            tool: "pgrep".to_string(),
            detail: format!("exit status {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemd_run_wrap_limited() {
        let launcher = SystemdRunLauncher;
        let argv = launcher.wrap(
            &["evolution".to_string()],
            MemoryBudget::Bytes(1_000_000),
        );
        assert_eq!(
            argv,
            vec![
                "systemd-run",
                "--user",
                "--scope",
                "-p",
                "MemoryHigh=1000000",
                "evolution"
            ]
        );
    }

    #[test]
    fn test_systemd_run_wrap_unlimited() {
        let launcher = SystemdRunLauncher;
        let argv = launcher.wrap(&["firefox".to_string()], MemoryBudget::Unlimited);
        assert!(argv.contains(&"MemoryHigh=infinity".to_string()));
    }

    #[test]
    fn test_direct_launcher_ignores_budget() {
        let launcher = DirectLauncher;
        let command = vec!["sleep".to_string(), "1".to_string()];
        assert_eq!(launcher.wrap(&command, MemoryBudget::Bytes(1)), command);
    }

    #[tokio::test]
    async fn test_assert_not_running_detects_self() {
        // The test runner process itself always matches.
        let result = assert_not_running("memsweep|cargo|rustc|.").await;
        assert!(matches!(
            result,
            Err(ExperimentError::AlreadyRunning { .. })
        ));
    }

    #[tokio::test]
    async fn test_assert_not_running_passes_for_nonsense_pattern() {
        let result = assert_not_running("no_such_process_name_zzz").await;
        assert!(result.is_ok());
    }
}
