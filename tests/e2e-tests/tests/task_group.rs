//! Supervised daemons running side by side in a task group.

use std::time::{Duration, Instant};

use ptp_perf_common::ErrorKind;
use ptp_perf_invoke::{GroupOutcome, Invocation, TaskGroup};

const DAEMON: &str = env!("CARGO_BIN_EXE_fake-ptp-daemon");

fn daemon(args: &[&str]) -> Invocation {
    Invocation::of_command([DAEMON]).append_args(args.iter().copied())
}

#[tokio::test]
async fn test_first_daemon_exit_leaves_siblings_running() {
    let short = daemon(&["--exit-after-ms", "200"]);
    let long = daemon(&[]);
    let long_handle = long.handle();

    let mut group = TaskGroup::new("benchmark");
    group.add("long", move |cancel| async move { long.run_until(cancel).await });
    group.add("short", move |cancel| async move { short.run_until(cancel).await });

    let outcome = group.run(None, false).await;
    assert_eq!(outcome, GroupOutcome::FirstCompleted("short".to_string()));
    assert_eq!(group.pending(), ["long".to_string()]);
    assert!(long_handle.running());

    group.cancel_pending().await.unwrap();
    assert!(!long_handle.running());
    assert!(group.is_empty());
}

#[tokio::test]
async fn test_grace_window_then_cancel() {
    let mut group = TaskGroup::new("run");
    for (label, args) in [("first", ["--exit-after-ms", "100"]), ("second", ["--exit-after-ms", "300"])] {
        let invocation = daemon(&args);
        group.add(label, move |cancel| async move { invocation.run_until(cancel).await });
    }
    let stuck = daemon(&["--ignore-sigterm"]).terminate_timeout(Duration::from_millis(200));
    group.add("stuck", move |cancel| async move { stuck.run_until(cancel).await });

    assert_eq!(group.run(None, false).await, GroupOutcome::FirstCompleted("first".to_string()));
    let started = Instant::now();
    assert_eq!(group.run(Some(Duration::from_millis(800)), true).await, GroupOutcome::TimedOut);
    assert!(started.elapsed() >= Duration::from_millis(700));
    assert_eq!(group.pending(), ["stuck".to_string()]);

    // The stuck daemon is killed, which fails its return code check.
    let error = group.cancel_pending().await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::GroupFailure);
}

#[tokio::test]
async fn test_bounded_run_times_out() {
    let invocation = daemon(&[]);
    let mut group = TaskGroup::new("bounded");
    group.add("daemon", move |cancel| async move { invocation.run_until(cancel).await });

    assert_eq!(group.run(Some(Duration::from_millis(300)), false).await, GroupOutcome::TimedOut);
    group.cancel_pending().await.unwrap();
    assert_eq!(group.run(None, false).await, GroupOutcome::Empty);
}
