//! Queueing benchmark runs and executing queued tasks.

use std::time::Duration;

use chrono::Utc;
use ptp_perf_invoke::shell_join;
use ptp_perf_scheduler::{QueueBenchmarks, ScheduleQueue, Scheduler};
use ptp_perf_store::{NewScheduleTask, RunKey, RunStore};
use tokio_util::sync::CancellationToken;

const DAEMON: &str = env!("CARGO_BIN_EXE_fake-ptp-daemon");

fn daemon_command(args: &[&str]) -> String {
    let mut argv = vec![DAEMON];
    argv.extend_from_slice(args);
    shell_join(&argv)
}

#[test]
fn test_queue_benchmarks_tops_up_to_target() {
    let directory = tempfile::tempdir().unwrap();
    let store = RunStore::open(directory.path().join("ptp-perf.sqlite3")).unwrap();
    let key = RunKey::new("base", "ptpd", "rpi-4");
    let run = store.create_run(&key, Utc::now() - chrono::Duration::minutes(20)).unwrap();
    store.finalize_run(run.id, Utc::now(), true, None).unwrap();

    let request = QueueBenchmarks {
        vendors: vec!["ptpd".to_string()],
        target_count: 3,
        ..QueueBenchmarks::new("base", vec!["rpi-4".to_string()])
    };
    let queued = ScheduleQueue::new(&store).queue_benchmarks(&request).unwrap();
    assert_eq!(queued.len(), 2);

    // Seen through a second connection, as the scheduler process would.
    let reopened = RunStore::open(directory.path().join("ptp-perf.sqlite3")).unwrap();
    let pending = reopened.pending_tasks().unwrap();
    assert_eq!(pending.len(), 2);
    for task in &pending {
        assert_eq!(task.priority, 0);
        assert!(task.start_time.is_none());
        assert!(task.success.is_none());
        assert!(task.command.contains("--benchmark base --vendor ptpd --cluster rpi-4"));
    }

    // Queueing again does not count pending tasks as runs.
    assert_eq!(ScheduleQueue::new(&store).queue_benchmarks(&request).unwrap().len(), 2);
}

#[tokio::test]
async fn test_scheduler_executes_queue_in_priority_order() {
    let store = RunStore::open_in_memory().unwrap();
    let queue = ScheduleQueue::new(&store);
    let low = queue
        .queue_task(&NewScheduleTask::new(
            "low",
            daemon_command(&["--exit-after-ms", "100"]),
            Duration::from_secs(30),
        ))
        .unwrap();
    let high = queue
        .queue_task(
            &NewScheduleTask::new(
                "high",
                daemon_command(&["--exit-after-ms", "100", "--exit-code", "2"]),
                Duration::from_secs(30),
            )
            .with_priority(5),
        )
        .unwrap();

    let scheduler = Scheduler::new(store.clone());
    let cancel = CancellationToken::new();
    let first = scheduler.run_next(&cancel).await.unwrap().unwrap();
    assert_eq!(first.id, high.id);
    assert_eq!(first.success, Some(false));

    let second = scheduler.run_next(&cancel).await.unwrap().unwrap();
    assert_eq!(second.id, low.id);
    assert_eq!(second.success, Some(true));
    assert!(store.pending_tasks().unwrap().is_empty());
}

#[tokio::test]
async fn test_overrunning_task_is_killed() {
    let store = RunStore::open_in_memory().unwrap();
    let mut task = NewScheduleTask::new("stuck", daemon_command(&[]), Duration::from_millis(300));
    task.slack_time = Duration::ZERO;
    ScheduleQueue::new(&store).queue_task(&task).unwrap();

    let started = std::time::Instant::now();
    let task = Scheduler::new(store.clone())
        .run_next(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.success, Some(false));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_interrupted_task_runs_again_after_restart() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("ptp-perf.sqlite3");
    let store = RunStore::open(&path).unwrap();
    let queued = ScheduleQueue::new(&store)
        .queue_task(&NewScheduleTask::new("daemon", daemon_command(&[]), Duration::from_secs(60)))
        .unwrap();

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        stopper.cancel();
    });
    assert!(Scheduler::new(store.clone()).run_next(&cancel).await.unwrap().is_none());
    assert!(store.pending_tasks().unwrap()[0].is_running());

    let restarted = RunStore::open(&path).unwrap();
    restarted.recover_interrupted_tasks().unwrap();
    let task = restarted.next_task().unwrap().unwrap();
    assert_eq!(task.id, queued.id);
    assert!(!task.is_running());
    assert_eq!(task.priority, 0);
}
