//! The experiment scope tree.
//!
//! Every phase of a run (the run itself, a workload, a memory level, one
//! sample) is a [`ContextNode`]: a directory, a scoped logger, a memory
//! budget, and exclusive ownership of the processes and monitor started
//! inside it. Closing a node tears all of that down, innermost scope first,
//! on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{ExperimentError, ExperimentResult};
use crate::domain::models::{ExitTimeouts, MemoryBudget};
use crate::infrastructure::launcher::{assert_not_running, MemoryLauncher};
use crate::infrastructure::monitor::{
    MonitorSession, DEFAULT_GRAPH_FILE, DEFAULT_SAMPLER, DEFAULT_STREAM_FILE,
};
use crate::infrastructure::screen::ScreenCapture;
use crate::services::process::ManagedProcess;
use crate::services::scope_log::ScopeLogger;

/// What a node in the scope tree represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRole {
    /// Top-level run, rooted at the output directory.
    Run,
    /// A named sub-phase (a workload, a grouping).
    Phase,
    /// One memory level of a sweep; overrides the inherited budget.
    MemoryLevel,
    /// One repeated sample within a memory level.
    Sample,
}

impl ContextRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Phase => "phase",
            Self::MemoryLevel => "memory_level",
            Self::Sample => "sample",
        }
    }
}

/// One scope of an experiment.
///
/// Children inherit the parent's budget, timeouts and collaborators at
/// creation time; there is no owning link in either direction afterwards.
pub struct ContextNode {
    name: String,
    role: ContextRole,
    dir: PathBuf,
    log: ScopeLogger,
    budget: MemoryBudget,
    timeouts: ExitTimeouts,
    launcher: Arc<dyn MemoryLauncher>,
    screen: Arc<dyn ScreenCapture>,
    sampler: String,
    processes: Vec<ManagedProcess>,
    monitor: Option<MonitorSession>,
    closed: bool,
}

impl ContextNode {
    /// Open the root scope of a run at `output_root` (created if absent).
    pub fn root(
        name: impl Into<String>,
        output_root: &Path,
        budget: MemoryBudget,
        timeouts: ExitTimeouts,
        launcher: Arc<dyn MemoryLauncher>,
        screen: Arc<dyn ScreenCapture>,
    ) -> ExperimentResult<Self> {
        let name = name.into();
        std::fs::create_dir_all(output_root)?;
        let log = ScopeLogger::open(&name, output_root)?;
        Ok(Self {
            name,
            role: ContextRole::Run,
            dir: output_root.to_path_buf(),
            log,
            budget,
            timeouts,
            launcher,
            screen,
            sampler: DEFAULT_SAMPLER.to_string(),
            processes: Vec::new(),
            monitor: None,
            closed: false,
        })
    }

    fn derive(&self, name: String, role: ContextRole, budget: MemoryBudget) -> ExperimentResult<Self> {
        let dir = self.dir.join(&name);
        // Idempotent: a directory left over from a prior partial run is fine.
        std::fs::create_dir_all(&dir)?;
        let log = self.log.child(&name, &dir)?;
        Ok(Self {
            name,
            role,
            dir,
            log,
            budget,
            timeouts: self.timeouts,
            launcher: Arc::clone(&self.launcher),
            screen: Arc::clone(&self.screen),
            sampler: self.sampler.clone(),
            processes: Vec::new(),
            monitor: None,
            closed: false,
        })
    }

    /// Open a named sub-phase inheriting this node's budget.
    pub fn child(&self, name: &str) -> ExperimentResult<Self> {
        self.derive(name.to_string(), ContextRole::Phase, self.budget)
    }

    /// Open a memory-level scope. The name encodes the sweep index and the
    /// human-readable budget, e.g. `07_1.2GiB`.
    pub fn child_with_memory(&self, index: usize, budget: MemoryBudget) -> ExperimentResult<Self> {
        self.derive(
            format!("{index:02}_{}", budget.label()),
            ContextRole::MemoryLevel,
            budget,
        )
    }

    /// Open a sample scope, named by its two-digit index.
    pub fn child_sample(&self, index: usize) -> ExperimentResult<Self> {
        self.derive(format!("{index:02}"), ContextRole::Sample, self.budget)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ContextRole {
        self.role
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn budget(&self) -> MemoryBudget {
        self.budget
    }

    pub fn logger(&self) -> &ScopeLogger {
        &self.log
    }

    pub fn processes(&self) -> &[ManagedProcess] {
        &self.processes
    }

    /// Resolve a file name inside this scope's directory.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Launch `command` under this scope's memory budget, in its own
    /// process group, and register it on this node. Callers wanting an
    /// exclusive start check [`assert_not_running`] first.
    pub fn start_app(&mut self, command: &[String]) -> ExperimentResult<i32> {
        let argv = self.launcher.wrap(command, self.budget);
        self.log.info(format!(
            "starting `{}` (budget {})",
            command.join(" "),
            self.budget
        ));
        let process = ManagedProcess::spawn(&argv)?;
        let pid = process.pid();
        self.processes.push(process);
        Ok(pid)
    }

    /// Start the memory-sampling monitor pinned to `pattern`, writing
    /// `graph.svg` and the sample stream into this scope's directory.
    ///
    /// Starting a second monitor while one is active logs a warning and
    /// does nothing. With `check_not_running`, fails with
    /// [`ExperimentError::AlreadyRunning`] if a matching process exists.
    pub async fn start_monitor(
        &mut self,
        pattern: &str,
        check_not_running: bool,
    ) -> ExperimentResult<()> {
        if self.monitor.is_some() {
            self.log
                .warn("start_monitor called while a monitor is active, refusing to start another");
            return Ok(());
        }
        if check_not_running {
            assert_not_running(pattern).await?;
        }
        self.log.info(format!("starting monitor for `{pattern}`"));
        let session = MonitorSession::spawn(
            &self.sampler,
            pattern,
            &self.path_of(DEFAULT_GRAPH_FILE),
            &self.path_of(DEFAULT_STREAM_FILE),
        )?;
        self.monitor = Some(session);
        Ok(())
    }

    /// Use a different sampler binary (a name on PATH or an absolute
    /// path). Children opened afterwards inherit it.
    pub fn set_sampler_program(&mut self, program: impl Into<String>) {
        self.sampler = program.into();
    }

    pub fn monitor_active(&self) -> bool {
        self.monitor.is_some()
    }

    /// Stop the active monitor. Returns false (with a warning) when none is
    /// active.
    pub async fn stop_monitor(&mut self) -> bool {
        if self.take_down_monitor().await {
            true
        } else {
            self.log
                .warn("stop_monitor called while no monitor is active");
            false
        }
    }

    async fn take_down_monitor(&mut self) -> bool {
        match self.monitor.take() {
            Some(session) => {
                self.log
                    .info(format!("stopping monitor for `{}`", session.pattern()));
                if let Err(e) = session.stop().await {
                    self.log.error(format!("monitor did not stop cleanly: {e}"));
                }
                true
            }
            None => false,
        }
    }

    /// Capture the display into `name` under this scope's directory. A
    /// missing display surface is a skip, not a failure.
    pub async fn screenshot(&self, name: &str) -> ExperimentResult<bool> {
        self.screen.capture(&self.path_of(name)).await
    }

    /// Write a small artifact (timing data, version string) into the scope.
    pub fn write_file(&self, name: &str, contents: impl AsRef<[u8]>) -> ExperimentResult<()> {
        std::fs::write(self.path_of(name), contents)?;
        Ok(())
    }

    fn any_process_exited(&mut self) -> bool {
        self.processes.iter_mut().any(ManagedProcess::has_exited)
    }

    /// Close this scope: classify the body's outcome, then tear everything
    /// down regardless of what that outcome was.
    ///
    /// Classification: an interrupt passes through untouched (no
    /// diagnostics); any other error first gets a diagnostic screenshot,
    /// then is swallowed with a warning if one of this scope's processes
    /// already exited (the memory ceiling is expected to kill the target on
    /// overrun) or propagated if every process is still alive (a scripting
    /// bug, not memory pressure). If teardown itself exceeded the warn
    /// threshold, the distinguished `TookTooLong` condition is returned so
    /// the sweep driver stops tightening the budget for this workload.
    pub async fn close(mut self, outcome: ExperimentResult<()>) -> ExperimentResult<()> {
        let mut verdict = match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.is_interrupt() => {
                self.log.info("interrupted, running teardown");
                Err(e)
            }
            Err(e) => {
                if let Err(shot) = self.screenshot("error_exception_raised.png").await {
                    self.log.warn(format!("diagnostic screenshot failed: {shot}"));
                }
                if self.any_process_exited() {
                    self.log.warn(format!(
                        "a process was found to be terminated, assuming out of memory: {e}"
                    ));
                    Ok(())
                } else {
                    self.log
                        .error(format!("all processes still alive, unexpected failure: {e}"));
                    Err(e)
                }
            }
        };

        let mut slowest: Option<Duration> = None;
        let mut processes = std::mem::take(&mut self.processes);
        for process in &mut processes {
            let duration = process
                .stop(&self.timeouts, &*self.screen, &self.dir, &self.log)
                .await;
            if slowest.is_none_or(|s| duration > s) {
                slowest = Some(duration);
            }
        }

        self.take_down_monitor().await;
        self.closed = true;

        if let (Some(warn), Some(duration)) = (self.timeouts.warn, slowest) {
            let interrupted = matches!(verdict, Err(ExperimentError::Interrupted));
            if duration > warn && !interrupted {
                verdict = Err(ExperimentError::TookTooLong {
                    exit_duration: duration,
                    warn,
                });
            }
        }

        verdict
    }
}

impl Drop for ContextNode {
    fn drop(&mut self) {
        if !self.closed && (!self.processes.is_empty() || self.monitor.is_some()) {
            // Cannot run async teardown here; make the leak loud.
            self.log.error(
                "context dropped without close(); owned processes or monitor were not stopped",
            );
        }
    }
}

impl std::fmt::Debug for ContextNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextNode")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("dir", &self.dir)
            .field("budget", &self.budget)
            .field("processes", &self.processes.len())
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MEGABYTE;
    use crate::infrastructure::launcher::DirectLauncher;
    use crate::infrastructure::screen::NoopScreen;

    /// Fast escalation but a generous warn threshold, so teardown speed
    /// never turns a verdict into TookTooLong by accident.
    fn fast_teardown() -> ExitTimeouts {
        ExitTimeouts {
            warn: Some(Duration::from_secs(30)),
            ..ExitTimeouts::immediate()
        }
    }

    fn test_root(dir: &Path) -> ContextNode {
        ContextNode::root(
            "run",
            dir,
            MemoryBudget::Unlimited,
            fast_teardown(),
            Arc::new(DirectLauncher),
            Arc::new(NoopScreen),
        )
        .unwrap()
    }

    #[test]
    fn test_child_directory_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = test_root(dir.path());

        let a = root.child("mail").unwrap();
        let b = root.child("mail").unwrap();
        assert_eq!(a.dir(), b.dir());
        assert!(a.dir().is_dir());
    }

    #[test]
    fn test_memory_child_overrides_budget_and_encodes_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = test_root(dir.path());

        let mem = root
            .child_with_memory(3, MemoryBudget::Bytes(2000 * MEGABYTE))
            .unwrap();
        assert_eq!(mem.name(), "03_2.0GiB");
        assert_eq!(mem.budget(), MemoryBudget::Bytes(2000 * MEGABYTE));
        assert_eq!(mem.role(), ContextRole::MemoryLevel);

        // Samples inherit the override.
        let sample = mem.child_sample(0).unwrap();
        assert_eq!(sample.name(), "00");
        assert_eq!(sample.budget(), MemoryBudget::Bytes(2000 * MEGABYTE));
    }

    #[test]
    fn test_logger_names_follow_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = test_root(dir.path());
        let sample = root
            .child("mail")
            .unwrap()
            .child_with_memory(0, MemoryBudget::Unlimited)
            .unwrap()
            .child_sample(7)
            .unwrap();
        assert_eq!(sample.logger().name(), "run.mail.00_nolimit.07");
    }

    #[tokio::test]
    async fn test_close_swallows_error_when_a_process_exited() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = test_root(dir.path());
        node.start_app(&["true".to_string()]).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let outcome = Err(ExperimentError::Unresponsive("button never appeared".into()));
        assert!(node.close(outcome).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_propagates_error_when_all_processes_alive() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = test_root(dir.path());
        node.start_app(&["sleep".to_string(), "30".to_string()])
            .unwrap();

        let outcome = Err(ExperimentError::Unresponsive("button never appeared".into()));
        let verdict = node.close(outcome).await;
        assert!(matches!(verdict, Err(ExperimentError::Unresponsive(_))));
    }

    #[tokio::test]
    async fn test_close_reports_took_too_long() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = ContextNode::root(
            "run",
            dir.path(),
            MemoryBudget::Unlimited,
            ExitTimeouts {
                warn: Some(Duration::ZERO),
                term: None,
                abort: None,
                kill: Some(Duration::from_millis(300)),
            },
            Arc::new(DirectLauncher),
            Arc::new(NoopScreen),
        )
        .unwrap();
        // Ignores SIGTERM, so teardown has to wait for the kill tier and
        // the exit duration exceeds the zero warn threshold.
        node.start_app(&[
            "sh".to_string(),
            "-c".to_string(),
            "trap '' TERM; while :; do sleep 0.1; done".to_string(),
        ])
        .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let verdict = node.close(Ok(())).await;
        assert!(matches!(
            verdict,
            Err(ExperimentError::TookTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn test_interrupt_passes_through_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = test_root(dir.path());
        node.start_app(&["sleep".to_string(), "30".to_string()])
            .unwrap();

        let verdict = node.close(Err(ExperimentError::Interrupted)).await;
        assert!(matches!(verdict, Err(ExperimentError::Interrupted)));
    }

    #[tokio::test]
    async fn test_stop_monitor_without_start_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = test_root(dir.path());
        assert!(!node.stop_monitor().await);
    }
}
