//! Screenshot capture seam.
//!
//! Capturing the display is best effort everywhere it is used: a missing
//! display surface (headless CI, an SSH session) skips the capture instead
//! of failing the experiment.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::domain::errors::{ExperimentError, ExperimentResult};

/// Captures the current display into a file.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Returns `Ok(true)` if a capture was written, `Ok(false)` if capture
    /// was skipped because no display is available.
    async fn capture(&self, path: &Path) -> ExperimentResult<bool>;
}

/// Shells out to an external grabber (`gnome-screenshot -f <path>` by
/// default). Skips cleanly when `$DISPLAY` and `$WAYLAND_DISPLAY` are both
/// unset.
#[derive(Debug, Clone)]
pub struct CommandScreenCapture {
    program: String,
}

impl CommandScreenCapture {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn display_available() -> bool {
        std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
    }
}

impl Default for CommandScreenCapture {
    fn default() -> Self {
        Self::new("gnome-screenshot")
    }
}

#[async_trait]
impl ScreenCapture for CommandScreenCapture {
    async fn capture(&self, path: &Path) -> ExperimentResult<bool> {
        if !Self::display_available() {
            debug!(path = %path.display(), "no display surface, skipping screenshot");
            return Ok(false);
        }

        let status = Command::new(&self.program)
            .arg("-f")
            .arg(path)
            .status()
            .await?;

        if status.success() {
            Ok(true)
        } else {
            Err(ExperimentError::ToolFailed {
                tool: self.program.clone(),
                detail: format!("exit status {:?}", status.code()),
            })
        }
    }
}

/// Never captures anything. Used in tests and headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScreen;

#[async_trait]
impl ScreenCapture for NoopScreen {
    async fn capture(&self, path: &Path) -> ExperimentResult<bool> {
        debug!(path = %path.display(), "noop screen capture");
        Ok(false)
    }
}

/// Records every requested capture path instead of touching the display.
/// Test instrumentation for asserting which diagnostics were taken.
#[derive(Debug, Default)]
pub struct RecordingScreen {
    captured: std::sync::Mutex<Vec<std::path::PathBuf>>,
}

impl RecordingScreen {
    pub fn captured(&self) -> Vec<std::path::PathBuf> {
        self.captured.lock().expect("capture log poisoned").clone()
    }
}

#[async_trait]
impl ScreenCapture for RecordingScreen {
    async fn capture(&self, path: &Path) -> ExperimentResult<bool> {
        self.captured
            .lock()
            .expect("capture log poisoned")
            .push(path.to_path_buf());
        Ok(true)
    }
}
