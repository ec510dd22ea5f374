//! The single-worker loop executing queued tasks.

use std::time::Duration;

use chrono::Utc;
use ptp_perf_common::Result;
use ptp_perf_config::format_duration;
use ptp_perf_invoke::Invocation;
use ptp_perf_store::{RunStore, ScheduleTask};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How often an empty or paused queue is checked again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct Scheduler {
    store: RunStore,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(store: RunStore) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Executes tasks one at a time until `cancel` fires.
    ///
    /// Tasks left running by an interrupted scheduler are queued again
    /// first. A task interrupted by `cancel` stays running in the store and
    /// is recovered the same way on the next start.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.store.recover_interrupted_tasks()?;
        info!("Scheduler started");

        while !cancel.is_cancelled() {
            if self.run_next(&cancel).await?.is_none() {
                tokio::select! {
                    _ = sleep(self.poll_interval) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Executes the next task, if the queue offers one.
    pub async fn run_next(&self, cancel: &CancellationToken) -> Result<Option<ScheduleTask>> {
        let Some(task) = self.store.next_task()? else {
            return Ok(None);
        };
        let task = self.store.mark_task_running(task.id, Utc::now())?;
        info!(
            task_id = task.id,
            "Running task {} (timeout {}): {}",
            task,
            format_duration(task.timeout()),
            task.command
        );

        let invocation = Invocation::of_shell(task.command.as_str());
        let success = tokio::select! {
            result = invocation.run_for(task.timeout()) => match result {
                Ok(()) => true,
                Err(e) => {
                    error!(task_id = task.id, "Task {} failed: {}", task, e);
                    false
                }
            },
            _ = cancel.cancelled() => {
                info!(task_id = task.id, "Scheduler interrupted while running {}", task);
                return Ok(None);
            }
        };

        let task = self.store.complete_task(task.id, success, Utc::now())?;
        info!(task_id = task.id, "Task {} completed, success: {}", task, success);
        Ok(Some(task))
    }
}
