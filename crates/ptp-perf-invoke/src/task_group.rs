//! Concurrent activities under one cancellation scope.
//!
//! A [`TaskGroup`] does not cancel siblings when one activity ends. The
//! usual sequence is:
//!
//! ```no_run
//! use ptp_perf_invoke::TaskGroup;
//! use std::time::Duration;
//!
//! # async fn example(mut group: TaskGroup) -> ptp_perf_common::Result<()> {
//! group.run(None, false).await;                            // first exit
//! group.run(Some(Duration::from_secs(10)), true).await;    // grace window
//! group.cancel_pending().await?;                           // shutdown
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use ptp_perf_common::{Error, Result};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why [`TaskGroup::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    /// The labelled activity finished first.
    FirstCompleted(String),
    /// Every activity has finished.
    AllCompleted,
    /// The duration elapsed with activities still running.
    TimedOut,
    /// There was nothing to wait for.
    Empty,
}

/// A set of concurrently running activities.
pub struct TaskGroup {
    name: String,
    cancel: CancellationToken,
    tasks: JoinSet<(String, Result<()>)>,
    pending: Vec<String>,
    finished: Vec<(String, Result<()>)>,
}

impl TaskGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_cancellation(name, CancellationToken::new())
    }

    /// Creates a group whose activities are also cancelled by `parent`.
    pub fn with_parent(name: impl Into<String>, parent: &CancellationToken) -> Self {
        Self::with_cancellation(name, parent.child_token())
    }

    fn with_cancellation(name: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            name: name.into(),
            cancel,
            tasks: JoinSet::new(),
            pending: Vec::new(),
            finished: Vec::new(),
        }
    }

    /// Registers and starts an activity.
    ///
    /// The activity receives the token it must observe for cancellation.
    pub fn add<F, Fut>(&mut self, label: impl Into<String>, activity: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let label = label.into();
        let future = activity(self.cancel.child_token());
        let task_label = label.clone();

        self.tasks.spawn(async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(Error::invalid_state(
                    task_label.as_str(),
                    format!("activity panicked: {}", panic_message(panic.as_ref())),
                )),
            };
            (task_label, result)
        });

        debug!(group = %self.name, task = %label, "Task added");
        self.pending.push(label);
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Labels of the activities that have not finished yet.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Waits for the first activity to finish, or for all of them with
    /// `wait_for_all`, bounded by `duration` when given.
    ///
    /// Failures of finished activities are kept and reported by
    /// [`TaskGroup::cancel_pending`].
    pub async fn run(&mut self, duration: Option<Duration>, wait_for_all: bool) -> GroupOutcome {
        if self.tasks.is_empty() {
            return GroupOutcome::Empty;
        }
        let deadline = duration.map(|duration| Instant::now() + duration);

        loop {
            let joined = match deadline {
                Some(deadline) => tokio::select! {
                    joined = self.tasks.join_next() => joined,
                    _ = sleep_until(deadline) => return GroupOutcome::TimedOut,
                },
                None => self.tasks.join_next().await,
            };

            let Some(joined) = joined else {
                return GroupOutcome::AllCompleted;
            };
            let label = self.record(joined);
            if !wait_for_all {
                return GroupOutcome::FirstCompleted(label);
            }
            if self.tasks.is_empty() {
                return GroupOutcome::AllCompleted;
            }
        }
    }

    /// Cancels every running activity and waits for all of them.
    ///
    /// All failures, including those of activities that finished before
    /// the call, are aggregated into one *group-failure* error. Calling this
    /// again after it returned is a no-op.
    pub async fn cancel_pending(&mut self) -> Result<()> {
        self.cancel.cancel();
        let cancelled = self.pending.clone();

        while let Some(joined) = self.tasks.join_next().await {
            let label = self.record(joined);
            if cancelled.contains(&label) {
                info!(group = %self.name, "Task '{}' was cancelled", label);
            }
        }

        let causes: Vec<(String, Error)> = self
            .finished
            .drain(..)
            .filter_map(|(label, result)| result.err().map(|error| (label, error)))
            .collect();
        if causes.is_empty() {
            Ok(())
        } else {
            Err(Error::group_failure(causes))
        }
    }

    fn record(&mut self, joined: std::result::Result<(String, Result<()>), JoinError>) -> String {
        let (label, result) = match joined {
            Ok(output) => output,
            Err(e) => (
                "unknown".to_string(),
                Err(Error::invalid_state(self.name.as_str(), format!("task aborted: {}", e))),
            ),
        };

        match &result {
            Ok(()) => debug!(group = %self.name, task = %label, "Task finished"),
            Err(e) => warn!(group = %self.name, task = %label, error = %e, "Task failed"),
        }
        if let Some(index) = self.pending.iter().position(|pending| *pending == label) {
            self.pending.remove(index);
        }
        self.finished.push((label.clone(), result));
        label
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
