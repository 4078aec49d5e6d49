//! Per-scope logging.
//!
//! Every context node owns a hierarchically named logger that writes one
//! line per significant event to the node's own `log.txt` and mirrors it to
//! the process-wide tracing stream. Line format follows the
//! `[timestamp LEVEL name] message` convention.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Log level for scope events. Mapped onto tracing levels for the shared
/// stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeLevel {
    Info,
    Warn,
    Error,
}

impl ScopeLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// A named, hierarchically scoped log sink.
///
/// Child logger names are `parent.name + "." + child`, so a sample deep in
/// the tree logs as e.g. `run.mail_native.03_1.6GiB.07`.
#[derive(Clone)]
pub struct ScopeLogger {
    name: String,
    file: Arc<Mutex<File>>,
}

impl ScopeLogger {
    /// Open a root logger writing to `dir/log.txt`.
    pub fn open(name: impl Into<String>, dir: &Path) -> std::io::Result<Self> {
        let name = name.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("log.txt"))?;
        Ok(Self {
            name,
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Open a child logger named `self.name + "." + name`, writing to its
    /// own `log.txt` under `dir`.
    pub fn child(&self, name: &str, dir: &Path) -> std::io::Result<Self> {
        Self::open(format!("{}.{name}", self.name), dir)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.write(ScopeLevel::Info, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.write(ScopeLevel::Warn, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.write(ScopeLevel::Error, msg.as_ref());
    }

    fn write(&self, level: ScopeLevel, msg: &str) {
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
        let line = format!("[{timestamp} {} {}] {msg}", level.as_str(), self.name);
        if let Ok(mut file) = self.file.lock() {
            // A full disk must not take the experiment down with it.
            let _ = writeln!(file, "{line}");
        }
        match level {
            ScopeLevel::Info => tracing::info!(scope = %self.name, "{msg}"),
            ScopeLevel::Warn => tracing::warn!(scope = %self.name, "{msg}"),
            ScopeLevel::Error => tracing::error!(scope = %self.name, "{msg}"),
        }
    }
}

impl std::fmt::Debug for ScopeLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeLogger")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
