//! The process supervisor driving a real child process.

use std::time::{Duration, Instant};

use e2e_tests::wait_until;
use ptp_perf_common::ErrorKind;
use ptp_perf_invoke::Invocation;
use tokio_util::sync::CancellationToken;

const DAEMON: &str = env!("CARGO_BIN_EXE_fake-ptp-daemon");

fn daemon<I: IntoIterator<Item = &'static str>>(args: I) -> Invocation {
    Invocation::of_command([DAEMON]).append_args(args)
}

#[tokio::test]
async fn test_graceful_termination() {
    let invocation = daemon([]);
    let handle = invocation.handle();
    let cancel = CancellationToken::new();

    let supervisor = tokio::spawn({
        let invocation = invocation.clone();
        let cancel = cancel.clone();
        async move { invocation.run_until(cancel).await }
    });
    wait_until("the daemon prints offsets", || invocation.output().contains("master offset")).await;

    cancel.cancel();
    supervisor.await.unwrap().unwrap();
    assert_eq!(handle.return_code(), Some(0));
    assert!(invocation.output().contains("terminated"));
    assert!(!handle.running());
}

#[tokio::test]
async fn test_sigterm_escalates_to_sigkill() {
    let invocation = daemon(["--ignore-sigterm"]).terminate_timeout(Duration::from_millis(300));
    let handle = invocation.handle();
    let cancel = CancellationToken::new();

    let supervisor = tokio::spawn({
        let invocation = invocation.clone();
        let cancel = cancel.clone();
        async move { invocation.run_until(cancel).await }
    });
    wait_until("the daemon is running", || invocation.output().contains("master offset")).await;

    let started = Instant::now();
    cancel.cancel();
    let error = supervisor.await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ProcessFailed);
    assert_eq!(handle.return_code(), Some(-9));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(invocation.output().contains("ignoring SIGTERM"));
}

#[tokio::test]
async fn test_keep_alive_restarts_after_clean_exit() {
    let invocation = daemon(["--exit-after-ms", "100"])
        .keep_alive(true)
        .restart_delay(Duration::from_millis(200));
    let handle = invocation.handle();
    let cancel = CancellationToken::new();

    let supervisor = tokio::spawn({
        let invocation = invocation.clone();
        let cancel = cancel.clone();
        async move { invocation.run_until(cancel).await }
    });
    wait_until("a second child started", || handle.restart_count() >= 1).await;

    cancel.cancel();
    supervisor.await.unwrap().unwrap();
    assert!(handle.restart_count() >= 1);
}

#[tokio::test]
async fn test_failing_child_is_reported() {
    let invocation = daemon(["--exit-after-ms", "100", "--exit-code", "3"]);
    let error = invocation.run().await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ProcessFailed);
    assert_eq!(invocation.return_code(), Some(3));

    let accepted = daemon(["--exit-after-ms", "100", "--exit-code", "3"]).accept_return_code(3);
    accepted.run().await.unwrap();
}

#[tokio::test]
async fn test_run_for_times_out() {
    let invocation = daemon([]);
    let started = Instant::now();
    let error = invocation.run_for(Duration::from_millis(300)).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!invocation.handle().running());
}

#[tokio::test]
async fn test_requested_restart() {
    let invocation = daemon([]);
    let handle = invocation.handle();
    assert_eq!(handle.restart(true, None).unwrap_err().kind(), ErrorKind::InvalidState);

    let cancel = CancellationToken::new();
    let supervisor = tokio::spawn({
        let invocation = invocation.clone();
        let cancel = cancel.clone();
        async move { invocation.run_until(cancel).await }
    });
    wait_until("the daemon is running", || handle.pid().is_some()).await;
    let first = handle.pid();

    handle.restart(true, Some(Duration::from_millis(50))).unwrap();
    wait_until("the daemon runs again", || handle.restart_count() == 1 && handle.pid().is_some()).await;
    assert_ne!(handle.pid(), first);

    cancel.cancel();
    supervisor.await.unwrap().unwrap();
}
