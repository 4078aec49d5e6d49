//! Infrastructure layer: external tool integrations and configuration.

pub mod config;
pub mod launcher;
pub mod monitor;
pub mod screen;

pub use config::{ConfigError, ConfigLoader};
pub use launcher::{assert_not_running, DirectLauncher, MemoryLauncher, SystemdRunLauncher};
pub use monitor::MonitorSession;
pub use screen::{CommandScreenCapture, NoopScreen, RecordingScreen, ScreenCapture};
