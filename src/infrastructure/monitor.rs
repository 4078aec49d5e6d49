//! Lifecycle wrapper for the external memory-sampling subprocess.
//!
//! The sampler (`smaps-profiler`) is pinned to processes matching a name
//! pattern and writes two artifacts into the owning scope's directory: a
//! vector graphic summarizing memory over time and a newline-delimited JSON
//! stream of raw samples on stdout. It terminates cleanly on SIGINT.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

use crate::domain::errors::{ExperimentError, ExperimentResult};

pub const DEFAULT_SAMPLER: &str = "smaps-profiler";
pub const DEFAULT_GRAPH_FILE: &str = "graph.svg";
pub const DEFAULT_STREAM_FILE: &str = "smaps_profiler.ndjson";

/// One running instance of the sampling subprocess, bound to the scope that
/// started it.
pub struct MonitorSession {
    child: Child,
    pattern: String,
    graph_path: PathBuf,
    stream_path: PathBuf,
}

impl MonitorSession {
    /// Spawn `program` (the sampler binary, by name or absolute path)
    /// pinned to `pattern`, with the graph written to `graph_path` and
    /// stdout redirected into `stream_path`.
    pub fn spawn(
        program: &str,
        pattern: &str,
        graph_path: &Path,
        stream_path: &Path,
    ) -> ExperimentResult<Self> {
        let stream_file = std::fs::File::create(stream_path)?;

        let child = Command::new(program)
            .arg("-c")
            .arg("-j")
            .arg("-g")
            .arg(graph_path)
            .arg("-m")
            .arg(pattern)
            .stdout(Stdio::from(stream_file))
            .spawn()
            .map_err(|e| ExperimentError::MonitorFailed(format!("failed to spawn sampler: {e}")))?;

        Ok(Self {
            child,
            pattern: pattern.to_string(),
            graph_path: graph_path.to_path_buf(),
            stream_path: stream_path.to_path_buf(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn graph_path(&self) -> &Path {
        &self.graph_path
    }

    pub fn stream_path(&self) -> &Path {
        &self.stream_path
    }

    /// Interrupt the sampler and block until it exits. Consumes the
    /// session: stop is attempted exactly once per start.
    pub async fn stop(mut self) -> ExperimentResult<()> {
        if let Some(pid) = self.child.id() {
            kill(Pid::from_raw(pid as i32), Signal::SIGINT)
                .map_err(|e| ExperimentError::MonitorFailed(format!("SIGINT failed: {e}")))?;
        }
        self.child
            .wait()
            .await
            .map_err(|e| ExperimentError::MonitorFailed(format!("wait failed: {e}")))?;
        Ok(())
    }
}
