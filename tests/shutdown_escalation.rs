//! Graduated-shutdown behavior against real child processes.

use std::path::Path;
use std::time::Duration;

use memsweep::infrastructure::screen::RecordingScreen;
use memsweep::services::process::ManagedProcess;
use memsweep::services::scope_log::ScopeLogger;
use memsweep::{ExitTimeouts, NoopScreen, ProcessState};

fn shell(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn log_in(dir: &Path) -> ScopeLogger {
    ScopeLogger::open("test", dir).unwrap()
}

#[tokio::test]
async fn signal_ignoring_process_is_killed_with_zero_timeouts() {
    let dir = tempfile::tempdir().unwrap();
    let log = log_in(dir.path());
    let mut proc =
        ManagedProcess::spawn(&shell("trap '' TERM ABRT; while :; do sleep 0.1; done")).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let duration = proc
        .stop(&ExitTimeouts::immediate(), &NoopScreen, dir.path(), &log)
        .await;

    assert_eq!(proc.state(), ProcessState::Killed);
    assert_eq!(proc.exit_duration(), Some(duration));
    assert!(duration < Duration::from_secs(10));
}

#[tokio::test]
async fn abort_responsive_process_exits_in_the_expected_window() {
    let dir = tempfile::tempdir().unwrap();
    let log = log_in(dir.path());
    // Ignores SIGTERM; exits about one second after the group SIGABRT.
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
    let duration = proc.stop(&timeouts, &screen, dir.path(), &log).await;

    assert_eq!(proc.state(), ProcessState::Exited);
    assert!(
        duration >= Duration::from_secs(5) && duration < Duration::from_secs(8),
        "exit duration outside the abort window: {duration:?}"
    );
    assert_eq!(
        screen
            .captured()
            .iter()
            .filter(|p| p.ends_with("error_abort_timeout.png"))
            .count(),
        1,
        "exactly one abort diagnostic expected"
    );
}

#[tokio::test]
async fn exit_durations_accumulate_monotonically_across_polls() {
    let dir = tempfile::tempdir().unwrap();
    let log = log_in(dir.path());
    let mut proc = ManagedProcess::spawn(&shell("trap '' TERM; sleep 1")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let timeouts = ExitTimeouts {
        warn: None,
        term: None,
        abort: None,
        kill: Some(Duration::from_secs(20)),
    };
    let duration = proc.stop(&timeouts, &NoopScreen, dir.path(), &log).await;

    // Exits naturally, well before the kill tier, after several poll
    // rounds: the recorded duration reflects the wait, not zero.
    assert_eq!(proc.state(), ProcessState::Exited);
    assert!(duration >= Duration::from_millis(300));
    assert!(duration < Duration::from_secs(5));
}

#[tokio::test]
async fn group_signal_reaches_children_the_main_pid_misses() {
    let dir = tempfile::tempdir().unwrap();
    let log = log_in(dir.path());
    // The parent shell ignores TERM and waits on a grandchild; only the
    // group-wide escalation can end the pair.
    let mut proc = ManagedProcess::spawn(&shell(
        "trap '' TERM; sh -c 'trap \"\" TERM; sleep 30' & wait",
    ))
    .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let timeouts = ExitTimeouts {
        warn: None,
        term: Some(Duration::ZERO),
        abort: Some(Duration::ZERO),
        kill: Some(Duration::from_secs(15)),
    };
    let duration = proc.stop(&timeouts, &NoopScreen, dir.path(), &log).await;

    assert!(proc.state().is_terminal());
    assert!(duration < Duration::from_secs(15));
}
