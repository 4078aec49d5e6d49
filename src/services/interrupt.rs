//! Run-wide operator-interrupt tracking.
//!
//! Tokio installs its process-wide SIGINT handler on the first `ctrl_c()`
//! call, and a signal delivered while no listener future is alive is
//! dropped. One watcher therefore owns the listener for the whole run and
//! latches the interrupt, so scope boundaries and teardown loops observe
//! it no matter when it arrived.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::domain::errors::{ExperimentError, ExperimentResult};

/// Latched interrupt state shared across the whole run.
#[derive(Debug, Clone)]
pub struct InterruptWatcher {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl InterruptWatcher {
    /// Watcher with no signal listener attached. Interrupts are injected
    /// with [`raise`](Self::raise); used by tests and by embedders that
    /// own signal handling themselves.
    pub fn manual() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Install the run-wide Ctrl-C listener. The listener task outlives
    /// every scope, so a signal arriving between samples or during
    /// teardown is still latched.
    pub fn install() -> Self {
        let watcher = Self::manual();
        let listener = watcher.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                listener.raise();
            }
        });
        watcher
    }

    /// Latch an interrupt and wake every waiter.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once an interrupt has been delivered.
    pub fn check(&self) -> ExperimentResult<()> {
        if self.raised() {
            Err(ExperimentError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Wait for an interrupt; resolves immediately if one was already
    /// delivered.
    pub async fn interrupted(&self) {
        // Register before the flag check so a raise in between cannot be
        // missed.
        let notified = self.notify.notified();
        if self.raised() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_raise_latches_and_wakes_waiters() {
        let watcher = InterruptWatcher::manual();
        assert!(!watcher.raised());
        assert!(watcher.check().is_ok());

        let waiter = watcher.clone();
        let handle = tokio::spawn(async move { waiter.interrupted().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        watcher.raise();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter never woke")
            .unwrap();

        assert!(watcher.raised());
        assert!(matches!(
            watcher.check(),
            Err(ExperimentError::Interrupted)
        ));
    }

    #[tokio::test]
    async fn test_interrupted_resolves_immediately_after_the_fact() {
        let watcher = InterruptWatcher::manual();
        watcher.raise();
        // Must not hang: the latch, not the wakeup, carries the state.
        tokio::time::timeout(Duration::from_secs(1), watcher.interrupted())
            .await
            .expect("latched interrupt not observed");
    }
}
