//! The scheduler's task queue.
//!
//! A task is pending until it has a completion time. The task being executed
//! carries [`RUNNING_PRIORITY`], its queued priority is kept aside and put
//! back once the task completes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use ptp_perf_common::{Error, Result};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use crate::models::{NewScheduleTask, ScheduleTask};
use crate::store::{optional_timestamp_at, to_micros, RunStore};

/// Priority of the task currently being executed.
pub const RUNNING_PRIORITY: i64 = 999;

const TASK_COLUMNS: &str = "id, name, command, priority, original_priority, paused, \
                            estimated_time_ms, slack_time_ms, start_time, completion_time, success";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleTask> {
    let estimated: i64 = row.get(6)?;
    let slack: i64 = row.get(7)?;
    Ok(ScheduleTask {
        id: row.get(0)?,
        name: row.get(1)?,
        command: row.get(2)?,
        priority: row.get(3)?,
        original_priority: row.get(4)?,
        paused: row.get(5)?,
        estimated_time: Duration::from_millis(estimated.max(0) as u64),
        slack_time: Duration::from_millis(slack.max(0) as u64),
        start_time: optional_timestamp_at(row, 8)?,
        completion_time: optional_timestamp_at(row, 9)?,
        success: row.get(10)?,
    })
}

impl RunStore {
    pub fn add_task(&self, task: &NewScheduleTask) -> Result<ScheduleTask> {
        if task.priority >= RUNNING_PRIORITY {
            return Err(Error::validation(format!(
                "Task priority must be below {}",
                RUNNING_PRIORITY
            )));
        }
        let id = self.with_connection(|c| {
            c.execute(
                "INSERT INTO schedule_tasks (name, command, priority, paused, estimated_time_ms, slack_time_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    task.name,
                    task.command,
                    task.priority,
                    task.paused,
                    task.estimated_time.as_millis() as i64,
                    task.slack_time.as_millis() as i64,
                ],
            )?;
            Ok(c.last_insert_rowid())
        })?;
        debug!(task_id = id, name = %task.name, "Queued task");
        self.get_task(id)
    }

    pub fn get_task(&self, id: i64) -> Result<ScheduleTask> {
        self.with_connection(|c| {
            c.query_row(
                &format!("SELECT {} FROM schedule_tasks WHERE id = ?1", TASK_COLUMNS),
                params![id],
                task_from_row,
            )
            .optional()
        })?
        .ok_or_else(|| Error::config_not_found(format!("schedule task {}", id)))
    }

    /// Pending tasks in execution order, a running task first.
    pub fn pending_tasks(&self) -> Result<Vec<ScheduleTask>> {
        self.with_connection(|c| {
            let mut statement = c.prepare(&format!(
                "SELECT {} FROM schedule_tasks WHERE completion_time IS NULL \
                 ORDER BY priority DESC, id ASC",
                TASK_COLUMNS
            ))?;
            let tasks = statement
                .query_map([], task_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    /// The task to execute next. A paused task at the head of the queue
    /// holds back everything behind it.
    pub fn next_task(&self) -> Result<Option<ScheduleTask>> {
        let head = self
            .pending_tasks()?
            .into_iter()
            .find(|task| !task.is_running());
        Ok(head.filter(|task| !task.paused))
    }

    /// Marks a task as executing. Only one task can execute at a time.
    pub fn mark_task_running(&self, id: i64, start_time: DateTime<Utc>) -> Result<ScheduleTask> {
        let task = self.get_task(id)?;
        if task.is_completed() || task.is_running() {
            return Err(Error::invalid_state(task.to_string(), "not waiting for execution"));
        }

        let updated = self.with_connection(|c| {
            let tx = c.transaction()?;
            let running: i64 = tx.query_row(
                "SELECT COUNT(*) FROM schedule_tasks WHERE priority = ?1 AND completion_time IS NULL",
                params![RUNNING_PRIORITY],
                |row| row.get(0),
            )?;
            if running > 0 {
                return Ok(false);
            }
            tx.execute(
                "UPDATE schedule_tasks SET original_priority = priority, priority = ?2, start_time = ?3 \
                 WHERE id = ?1",
                params![id, RUNNING_PRIORITY, to_micros(start_time)],
            )?;
            tx.commit()?;
            Ok(true)
        })?;

        if !updated {
            return Err(Error::invalid_state(task.to_string(), "another task is running"));
        }
        self.get_task(id)
    }

    /// Records the outcome of a task and restores its queued priority.
    pub fn complete_task(&self, id: i64, success: bool, completion_time: DateTime<Utc>) -> Result<ScheduleTask> {
        self.with_connection(|c| {
            c.execute(
                "UPDATE schedule_tasks SET completion_time = ?2, success = ?3, \
                 priority = COALESCE(original_priority, priority) WHERE id = ?1",
                params![id, to_micros(completion_time), success],
            )
        })?;
        self.get_task(id)
    }

    /// Puts tasks left executing by an interrupted scheduler back in the queue.
    pub fn recover_interrupted_tasks(&self) -> Result<usize> {
        let recovered = self.with_connection(|c| {
            c.execute(
                "UPDATE schedule_tasks SET priority = COALESCE(original_priority, priority), \
                 original_priority = NULL, start_time = NULL \
                 WHERE start_time IS NOT NULL AND completion_time IS NULL",
                [],
            )
        })?;
        if recovered > 0 {
            info!(count = recovered, "Requeued interrupted tasks");
        }
        Ok(recovered)
    }

    pub fn set_task_paused(&self, id: i64, paused: bool) -> Result<()> {
        self.with_connection(|c| {
            c.execute(
                "UPDATE schedule_tasks SET paused = ?2 WHERE id = ?1",
                params![id, paused],
            )
        })?;
        Ok(())
    }

    pub fn remove_task(&self, id: i64) -> Result<()> {
        let removed = self.with_connection(|c| {
            c.execute(
                "DELETE FROM schedule_tasks WHERE id = ?1 AND completion_time IS NULL",
                params![id],
            )
        })?;
        if removed == 0 {
            return Err(Error::config_not_found(format!("pending schedule task {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptp_perf_common::ErrorKind;

    fn queue(store: &RunStore, name: &str, priority: i64) -> ScheduleTask {
        store
            .add_task(&NewScheduleTask::new(name, "true", Duration::from_secs(60)).with_priority(priority))
            .unwrap()
    }

    #[test]
    fn test_order_by_priority_then_id() {
        let store = RunStore::open_in_memory().unwrap();
        let first = queue(&store, "first", 0);
        let urgent = queue(&store, "urgent", 5);
        queue(&store, "last", 0);

        assert_eq!(store.next_task().unwrap().unwrap().id, urgent.id);
        store.mark_task_running(urgent.id, Utc::now()).unwrap();
        assert_eq!(store.pending_tasks().unwrap()[0].priority, RUNNING_PRIORITY);
        assert_eq!(store.next_task().unwrap().unwrap().id, first.id);

        let done = store.complete_task(urgent.id, true, Utc::now()).unwrap();
        assert_eq!(done.priority, 5);
        assert_eq!(done.success, Some(true));
        assert_eq!(store.pending_tasks().unwrap().len(), 2);
    }

    #[test]
    fn test_only_one_running_task() {
        let store = RunStore::open_in_memory().unwrap();
        let a = queue(&store, "a", 0);
        let b = queue(&store, "b", 0);
        store.mark_task_running(a.id, Utc::now()).unwrap();

        let err = store.mark_task_running(b.id, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = store.mark_task_running(a.id, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_paused_head_blocks_queue() {
        let store = RunStore::open_in_memory().unwrap();
        let pause = store.add_task(&NewScheduleTask::pause().with_priority(1)).unwrap();
        let work = queue(&store, "work", 0);

        assert!(store.next_task().unwrap().is_none());
        store.set_task_paused(pause.id, false).unwrap();
        assert_eq!(store.next_task().unwrap().unwrap().id, pause.id);

        store.remove_task(pause.id).unwrap();
        assert_eq!(store.next_task().unwrap().unwrap().id, work.id);
        assert_eq!(store.remove_task(pause.id).unwrap_err().kind(), ErrorKind::ConfigNotFound);
    }

    #[test]
    fn test_recover_interrupted() {
        let store = RunStore::open_in_memory().unwrap();
        let task = queue(&store, "t", 3);
        store.mark_task_running(task.id, Utc::now()).unwrap();

        assert_eq!(store.recover_interrupted_tasks().unwrap(), 1);
        let task = store.get_task(task.id).unwrap();
        assert_eq!(task.priority, 3);
        assert!(!task.is_running());
    }

    #[test]
    fn test_reserved_priority_rejected() {
        let store = RunStore::open_in_memory().unwrap();
        let err = store
            .add_task(&NewScheduleTask::new("x", "true", Duration::ZERO).with_priority(RUNNING_PRIORITY))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
