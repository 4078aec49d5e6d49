//! Supervised application processes and their graduated shutdown.
//!
//! A [`ManagedProcess`] wraps one externally memory-constrained launch in
//! its own process group. Shutdown escalates through an ordered ladder:
//! SIGTERM to the primary process, SIGABRT to the whole group (some targets
//! spawn helpers that ignore signals sent only to the main process), and
//! finally SIGKILL to the group, each tier bounded by its own optional
//! timeout.

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};

use crate::domain::errors::{ExperimentError, ExperimentResult};
use crate::domain::models::{ExitTimeouts, ProcessState};
use crate::infrastructure::screen::ScreenCapture;
use crate::services::scope_log::ScopeLogger;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One launched application process and its shutdown bookkeeping.
pub struct ManagedProcess {
    child: Child,
    /// Pid at spawn time; also the process-group id, because the child is
    /// spawned with `process_group(0)`.
    pid: i32,
    command_line: String,
    state: ProcessState,
    exit_duration: Option<Duration>,
}

impl ManagedProcess {
    /// Spawn `argv` in a new process group.
    pub fn spawn(argv: &[String]) -> ExperimentResult<Self> {
        let command_line = argv.join(" ");
        let (program, args) = argv.split_first().ok_or_else(|| {
            ExperimentError::LaunchFailed {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            }
        })?;

        let child = Command::new(program)
            .args(args)
            .process_group(0)
            .spawn()
            .map_err(|source| ExperimentError::LaunchFailed {
                command: command_line.clone(),
                source,
            })?;

        let pid = child.id().map(|p| p as i32).ok_or_else(|| {
            ExperimentError::LaunchFailed {
                command: command_line.clone(),
                source: std::io::Error::other("no pid after spawn"),
            }
        })?;

        Ok(Self {
            child,
            pid,
            command_line,
            state: ProcessState::Running,
            exit_duration: None,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Wall-clock time from the termination request to confirmed exit.
    pub fn exit_duration(&self) -> Option<Duration> {
        self.exit_duration
    }

    /// Non-blocking check; updates state on natural exit.
    pub fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => {
                if !self.state.is_terminal() {
                    self.state = ProcessState::Exited;
                }
                true
            }
            Ok(None) => false,
            // The handle is gone; nothing left to supervise.
            Err(_) => true,
        }
    }

    fn signal_main(&self, signal: Signal) -> ExperimentResult<()> {
        kill(Pid::from_raw(self.pid), signal)?;
        Ok(())
    }

    fn signal_group(&self, signal: Signal) -> ExperimentResult<()> {
        killpg(Pid::from_raw(self.pid), signal)?;
        Ok(())
    }

    /// Graduated shutdown. Returns the exit duration, measured from the
    /// termination request. Diagnostic screenshots land in `dir`.
    ///
    /// Tier ordering within the ladder is terminate -> abort-all -> kill;
    /// a `None` timeout disables its tier.
    pub async fn stop(
        &mut self,
        timeouts: &ExitTimeouts,
        screen: &dyn ScreenCapture,
        dir: &Path,
        log: &ScopeLogger,
    ) -> Duration {
        if self.has_exited() {
            self.exit_duration = Some(Duration::ZERO);
            return Duration::ZERO;
        }

        log.info(format!("sending SIGTERM to {}", self.pid));
        if let Err(e) = self.signal_main(Signal::SIGTERM) {
            log.warn(format!("SIGTERM delivery failed: {e}"));
        }
        self.state = ProcessState::TerminationRequested;

        let start = Instant::now();
        let mut term_handled = timeouts.term.is_none();
        let mut abort_sent = timeouts.abort.is_none();

        loop {
            if self.has_exited() {
                break;
            }
            let elapsed = start.elapsed();

            if !term_handled && timeouts.term.is_some_and(|t| elapsed >= t) {
                self.diagnostic(screen, dir, "error_terminate_timeout.png", log)
                    .await;
                log.warn(format!(
                    "{} did not exit within the terminate timeout",
                    self.pid
                ));
                term_handled = true;
            }

            if !abort_sent && timeouts.abort.is_some_and(|t| elapsed >= t) {
                self.diagnostic(screen, dir, "error_abort_timeout.png", log)
                    .await;
                log.warn(format!("sending SIGABRT to process group {}", self.pid));
                if let Err(e) = self.signal_group(Signal::SIGABRT) {
                    log.warn(format!("SIGABRT delivery failed: {e}"));
                }
                self.state = ProcessState::AbortRequested;
                abort_sent = true;
            }

            if timeouts.kill.is_some_and(|t| elapsed >= t) {
                log.warn(format!("sending SIGKILL to process group {}", self.pid));
                if let Err(e) = self.signal_group(Signal::SIGKILL) {
                    log.warn(format!("SIGKILL delivery failed: {e}"));
                }
                self.state = ProcessState::Killed;
                if let Err(e) = self.child.wait().await {
                    log.error(format!("failed to reap {}: {e}", self.pid));
                }
                break;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let duration = start.elapsed();
        self.exit_duration = Some(duration);
        log.info(format!(
            "{} exited in {:.1} s ({})",
            self.pid,
            duration.as_secs_f64(),
            self.state.as_str()
        ));
        duration
    }

    async fn diagnostic(
        &self,
        screen: &dyn ScreenCapture,
        dir: &Path,
        name: &str,
        log: &ScopeLogger,
    ) {
        if let Err(e) = screen.capture(&dir.join(name)).await {
            log.warn(format!("diagnostic screenshot {name} failed: {e}"));
        }
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("pid", &self.pid)
            .field("command_line", &self.command_line)
            .field("state", &self.state)
            .field("exit_duration", &self.exit_duration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::screen::NoopScreen;

    fn shell(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn test_log(dir: &Path) -> ScopeLogger {
        ScopeLogger::open("test", dir).unwrap()
    }

    #[tokio::test]
    async fn test_stop_already_exited_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        let mut proc = ManagedProcess::spawn(&shell("true")).unwrap();

        // Give it a moment to finish on its own.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let d = proc
            .stop(&ExitTimeouts::default(), &NoopScreen, dir.path(), &log)
            .await;
        assert_eq!(d, Duration::ZERO);
        assert_eq!(proc.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn test_sigterm_is_enough_for_cooperative_process() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        let mut proc = ManagedProcess::spawn(&shell("sleep 30")).unwrap();

        let d = proc
            .stop(&ExitTimeouts::default(), &NoopScreen, dir.path(), &log)
            .await;
        assert_eq!(proc.state(), ProcessState::Exited);
        assert!(d < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_signal_ignoring_process_reaches_killed() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        // Ignore TERM and ABRT; only SIGKILL can end this.
        let mut proc =
            ManagedProcess::spawn(&shell("trap '' TERM ABRT; while :; do sleep 0.1; done"))
                .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let d = proc
            .stop(&ExitTimeouts::immediate(), &NoopScreen, dir.path(), &log)
            .await;
        assert_eq!(proc.state(), ProcessState::Killed);
        assert!(proc.exit_duration().is_some());
        assert!(d < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_disabled_tiers_never_escalate() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        // Exits on its own shortly; no tier should fire.
        let mut proc = ManagedProcess::spawn(&shell("trap '' TERM; sleep 0.5")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let d = proc
            .stop(&ExitTimeouts::never(), &NoopScreen, dir.path(), &log)
            .await;
        assert_eq!(proc.state(), ProcessState::Exited);
        assert!(d < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_abort_tier_captures_diagnostic_and_duration_window() {
        use crate::infrastructure::screen::RecordingScreen;

        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        // Ignores TERM; exits roughly one second after SIGABRT.
        let mut proc = ManagedProcess::spawn(&shell(
            "trap '' TERM; trap 'sleep 1; exit 0' ABRT; while :; do sleep 0.1; done",
        ))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let screen = RecordingScreen::default();
        let timeouts = ExitTimeouts {
            warn: Some(Duration::from_secs(1)),
            term: Some(Duration::from_secs(2)),
            abort: Some(Duration::from_secs(5)),
            kill: Some(Duration::from_secs(30)),
        };
        let d = proc.stop(&timeouts, &screen, dir.path(), &log).await;

        assert_eq!(proc.state(), ProcessState::Exited);
        assert!(d >= Duration::from_secs(5), "exited before abort tier: {d:?}");
        assert!(d < Duration::from_secs(8), "took too long after abort: {d:?}");

        let captured = screen.captured();
        assert!(captured
            .iter()
            .any(|p| p.ends_with("error_terminate_timeout.png")));
        assert_eq!(
            captured
                .iter()
                .filter(|p| p.ends_with("error_abort_timeout.png"))
                .count(),
            1
        );
    }
}
