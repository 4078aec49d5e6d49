//! The top-level sweep driver.
//!
//! For each workload, for each budget in the decay sequence, for each
//! repeated sample, the runner opens the nested scopes, hands the sample
//! scope to the workload's driver, and closes the scope. A `TookTooLong`
//! verdict freezes the sweep for that workload (no tighter budgets); any
//! other failure costs only the sample; an operator interrupt unwinds the
//! whole run through every scope's teardown.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::errors::{ExperimentError, ExperimentResult};
use crate::domain::models::{decay, Config, MemoryBudget, WorkloadConfig};
use crate::infrastructure::launcher::{assert_not_running, MemoryLauncher, SystemdRunLauncher};
use crate::infrastructure::monitor::DEFAULT_GRAPH_FILE;
use crate::infrastructure::screen::{CommandScreenCapture, ScreenCapture};
use crate::services::context::ContextNode;
use crate::services::interrupt::InterruptWatcher;

pub const GRAPHS_ALL_DIR: &str = "graphs_all";

/// A scripted interaction with one application, run once per sample scope.
/// Image-driven UI scripts implement this; the built-in [`AppWorkload`]
/// covers launch-settle-screenshot workloads.
#[async_trait]
pub trait WorkloadDriver: Send + Sync {
    fn name(&self) -> &str;

    /// The launch command, used for the version artifact. Drivers that
    /// launch nothing return None.
    fn command(&self) -> Option<&[String]> {
        None
    }

    async fn run(&self, ctx: &mut ContextNode) -> ExperimentResult<()>;
}

/// Generic driver: assert the target is not already running, start the
/// monitor, launch the application under the scope's budget, give the
/// interaction time to settle, and capture the final screenshot. Teardown
/// is the scope's job.
pub struct AppWorkload {
    config: WorkloadConfig,
}

impl AppWorkload {
    pub fn new(config: WorkloadConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WorkloadDriver for AppWorkload {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn command(&self) -> Option<&[String]> {
        Some(&self.config.command)
    }

    async fn run(&self, ctx: &mut ContextNode) -> ExperimentResult<()> {
        assert_not_running(&self.config.pattern).await?;
        ctx.start_monitor(&self.config.pattern, false).await?;
        ctx.start_app(&self.config.command)?;

        tokio::time::sleep(Duration::from_secs(self.config.settle_secs)).await;
        ctx.screenshot("app.png").await?;
        Ok(())
    }
}

/// Drives a full run: workloads x budgets x samples.
pub struct ExperimentRunner {
    config: Config,
    launcher: Arc<dyn MemoryLauncher>,
    screen: Arc<dyn ScreenCapture>,
}

impl ExperimentRunner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            launcher: Arc::new(SystemdRunLauncher),
            screen: Arc::new(CommandScreenCapture::default()),
        }
    }

    /// Swap the external collaborators, mainly for tests and headless runs.
    pub fn with_collaborators(
        config: Config,
        launcher: Arc<dyn MemoryLauncher>,
        screen: Arc<dyn ScreenCapture>,
    ) -> Self {
        Self {
            config,
            launcher,
            screen,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn budgets_for(&self, workload: &WorkloadConfig) -> Vec<MemoryBudget> {
        let start = workload
            .start_budget
            .unwrap_or(self.config.sweep.start_budget);
        decay(start, self.config.sweep.decay_rate, self.config.sweep.steps)
    }

    /// Run the configured workloads with the built-in driver.
    pub async fn run(&self, output_root: &Path) -> ExperimentResult<()> {
        let drivers: Vec<Box<dyn WorkloadDriver>> = self
            .config
            .workloads
            .iter()
            .cloned()
            .map(|w| Box::new(AppWorkload::new(w)) as Box<dyn WorkloadDriver>)
            .collect();
        self.run_with_drivers(output_root, &drivers, &InterruptWatcher::install())
            .await
    }

    /// Run the full sweep with the given drivers, matched to configured
    /// workloads by name (drivers without config fall back to sweep
    /// defaults). The watcher carries the operator's interrupt; it is
    /// consulted at every scope boundary, so a Ctrl-C delivered during
    /// teardown still unwinds the run.
    pub async fn run_with_drivers(
        &self,
        output_root: &Path,
        drivers: &[Box<dyn WorkloadDriver>],
        interrupts: &InterruptWatcher,
    ) -> ExperimentResult<()> {
        let root = ContextNode::root(
            "run",
            output_root,
            MemoryBudget::Unlimited,
            self.config.timeouts.to_exit_timeouts(),
            Arc::clone(&self.launcher),
            Arc::clone(&self.screen),
        )?;

        let graphs_all = root.path_of(GRAPHS_ALL_DIR);
        std::fs::create_dir_all(&graphs_all)?;
        self.write_run_info(&root);

        let mut interrupted = false;
        for driver in drivers {
            if interrupted {
                break;
            }
            let workload_ctx = root.child(driver.name())?;
            self.record_version(&workload_ctx, driver.as_ref()).await;

            let outcome = self
                .sweep_workload(&workload_ctx, driver.as_ref(), &graphs_all, interrupts)
                .await;
            let outcome_for_close = match outcome {
                Err(ExperimentError::Interrupted) => {
                    interrupted = true;
                    Err(ExperimentError::Interrupted)
                }
                other => other,
            };
            if let Err(e) = workload_ctx.close(outcome_for_close).await {
                if e.is_interrupt() {
                    interrupted = true;
                } else {
                    warn!(workload = driver.name(), error = %e, "workload sweep failed");
                }
            }
            // A signal during the workload's own teardown is latched, not
            // lost.
            if interrupts.raised() {
                interrupted = true;
            }
        }

        let root_outcome = if interrupted {
            Err(ExperimentError::Interrupted)
        } else {
            Ok(())
        };
        root.close(root_outcome).await
    }

    /// Sweep one workload across its budget ladder. Returns `Interrupted`
    /// to unwind; all other failures are contained here.
    async fn sweep_workload(
        &self,
        workload_ctx: &ContextNode,
        driver: &dyn WorkloadDriver,
        graphs_all: &Path,
        interrupts: &InterruptWatcher,
    ) -> ExperimentResult<()> {
        interrupts.check()?;
        let workload_config = self
            .config
            .workloads
            .iter()
            .find(|w| w.name == driver.name())
            .cloned()
            .unwrap_or_else(|| WorkloadConfig {
                name: driver.name().to_string(),
                command: driver.command().map(<[String]>::to_vec).unwrap_or_default(),
                pattern: driver.name().to_string(),
                settle_secs: 30,
                start_budget: None,
            });
        let budgets = self.budgets_for(&workload_config);
        if budgets.is_empty() {
            workload_ctx
                .logger()
                .warn("sweep has zero steps, nothing to do");
            return Ok(());
        }

        for (index, budget) in budgets.iter().enumerate() {
            let memory_ctx = workload_ctx.child_with_memory(index, *budget)?;
            let mut freeze = false;

            for sample in 0..self.config.sweep.samples {
                let result = if interrupts.raised() {
                    Err(ExperimentError::Interrupted)
                } else {
                    self.run_sample(&memory_ctx, driver, sample, graphs_all, interrupts)
                        .await
                };
                match result {
                    Ok(()) => {}
                    Err(ExperimentError::TookTooLong { exit_duration, warn }) => {
                        memory_ctx.logger().warn(format!(
                            "application took {:.1} s (> {:.1} s) to exit; refusing to reduce \
                             memory any more for this workload",
                            exit_duration.as_secs_f64(),
                            warn.as_secs_f64()
                        ));
                        freeze = true;
                        break;
                    }
                    Err(ExperimentError::Interrupted) => {
                        let _ = memory_ctx.close(Err(ExperimentError::Interrupted)).await;
                        return Err(ExperimentError::Interrupted);
                    }
                    Err(e) => {
                        memory_ctx
                            .logger()
                            .warn(format!("sample {sample:02} failed: {e}"));
                    }
                }
            }

            if let Err(e) = memory_ctx.close(Ok(())).await {
                if e.is_interrupt() {
                    return Err(e);
                }
                warn!(budget = %budget, error = %e, "memory level teardown reported an error");
                if matches!(e, ExperimentError::TookTooLong { .. }) {
                    freeze = true;
                }
            }

            if freeze {
                info!(
                    workload = driver.name(),
                    budget = %budget,
                    "sweep frozen, continuing with next workload"
                );
                break;
            }
        }
        Ok(())
    }

    /// One sample: open the scope, run the driver (racing the operator's
    /// interrupt), close the scope, and flatten the graph artifact into the
    /// aggregate directory.
    async fn run_sample(
        &self,
        memory_ctx: &ContextNode,
        driver: &dyn WorkloadDriver,
        sample: usize,
        graphs_all: &Path,
        interrupts: &InterruptWatcher,
    ) -> ExperimentResult<()> {
        let mut sample_ctx = memory_ctx.child_sample(sample)?;
        let sample_name = sample_ctx.name().to_string();
        let graph_src = sample_ctx.path_of(DEFAULT_GRAPH_FILE);

        let body = tokio::select! {
            result = driver.run(&mut sample_ctx) => result,
            () = interrupts.interrupted() => Err(ExperimentError::Interrupted),
        };
        let verdict = sample_ctx.close(body).await;

        // Flatten the graph for cross-run comparison regardless of verdict.
        if graph_src.exists() {
            let dest = graphs_all.join(format!(
                "{}_{}_{}.svg",
                driver.name(),
                memory_ctx.budget().label(),
                sample_name
            ));
            if let Err(e) = std::fs::copy(&graph_src, &dest) {
                warn!(error = %e, "failed to copy graph into {}", GRAPHS_ALL_DIR);
            }
        }

        // An interrupt that landed during teardown still unwinds the run,
        // it just never outranks a real failure verdict.
        verdict?;
        interrupts.check()
    }

    /// Record the workload's version string, best effort.
    async fn record_version(&self, workload_ctx: &ContextNode, driver: &dyn WorkloadDriver) {
        let Some(command) = driver.command() else {
            return;
        };
        let Some(program) = command.first() else {
            return;
        };
        let output = tokio::process::Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => {
                if let Err(e) = workload_ctx.write_file("version", &out.stdout) {
                    workload_ctx
                        .logger()
                        .warn(format!("could not record version: {e}"));
                }
            }
            _ => workload_ctx
                .logger()
                .warn(format!("`{program} --version` not available")),
        }
    }

    /// Write a run-level description of the configuration that produced
    /// these artifacts.
    fn write_run_info(&self, root: &ContextNode) {
        #[derive(serde::Serialize)]
        struct RunInfo<'a> {
            started_at: String,
            config: &'a Config,
        }
        let info = RunInfo {
            started_at: chrono::Local::now().to_rfc3339(),
            config: &self.config,
        };
        match serde_yaml::to_string(&info) {
            Ok(yaml) => {
                if let Err(e) = root.write_file("run_info.yaml", yaml) {
                    root.logger().warn(format!("could not write run_info.yaml: {e}"));
                }
            }
            Err(e) => root
                .logger()
                .warn(format!("could not serialize run info: {e}")),
        }
    }
}
