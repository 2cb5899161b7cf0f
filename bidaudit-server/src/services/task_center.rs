//! Background task registry
//!
//! Tracks upload and extraction pipelines so clients can show progress after
//! navigating away. The list is written through to a [`KeyValueStore`] on
//! every status change; progress ticks stay in memory since running tasks
//! are marked interrupted on restart anyway. Only the newest
//! [`MAX_FINISHED_TASKS`] finished tasks are retained. Removing a task does
//! not stop its work; later updates to the removed id are dropped.

use bidaudit_common::kv_store::{get_typed, put_typed, KeyValueStore};
use bidaudit_common::Result;
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::{TaskKind, TaskRecord, TaskStatus};

const TASKS_KEY: &str = "tasks";

/// Completed and failed tasks kept before the oldest are dropped
pub const MAX_FINISHED_TASKS: usize = 200;

/// Drop the oldest finished tasks beyond the cap; live tasks always stay.
/// Returns how many were dropped.
fn prune_finished(tasks: &mut Vec<TaskRecord>) -> usize {
    let finished = tasks.iter().filter(|t| t.is_terminal()).count();
    let mut excess = finished.saturating_sub(MAX_FINISHED_TASKS);
    let dropped = excess;
    // Oldest first, as tasks are appended in creation order
    tasks.retain(|t| {
        if excess > 0 && t.is_terminal() {
            excess -= 1;
            false
        } else {
            true
        }
    });
    dropped
}

pub struct TaskCenter {
    store: Arc<dyn KeyValueStore>,
    tasks: Mutex<Vec<TaskRecord>>,
    /// Serializes writes so an older snapshot never lands after a newer one
    write_lock: Mutex<()>,
}

impl TaskCenter {
    /// Load persisted tasks. Anything still pending or running belonged to a
    /// previous process and is marked failed.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let mut tasks: Vec<TaskRecord> = get_typed(store.as_ref(), TASKS_KEY)?.unwrap_or_default();

        let mut interrupted = 0;
        for task in tasks.iter_mut().filter(|t| !t.is_terminal()) {
            task.status = TaskStatus::Failed;
            task.error = Some("interrupted".to_string());
            task.updated_at = Utc::now();
            interrupted += 1;
        }
        if interrupted > 0 {
            tracing::warn!(interrupted, "Marked interrupted background tasks as failed");
        }
        let pruned = prune_finished(&mut tasks);
        if interrupted > 0 || pruned > 0 {
            put_typed(store.as_ref(), TASKS_KEY, &tasks)?;
        }
        tracing::info!(tasks = tasks.len(), pruned, "Task center loaded");

        Ok(Self {
            store,
            tasks: Mutex::new(tasks),
            write_lock: Mutex::new(()),
        })
    }

    /// Write a snapshot of the list. The task lock is released before the
    /// store is touched.
    fn persist(&self) {
        let _write = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Err(e) = put_typed(self.store.as_ref(), TASKS_KEY, &snapshot) {
            tracing::warn!(error = %e, "Failed to persist task list");
        }
    }

    /// Apply `change` to a live task. Returns `false` when the task was
    /// removed or has already finished.
    fn update<F>(&self, id: &str, persist: bool, change: F) -> bool
    where
        F: FnOnce(&mut TaskRecord),
    {
        {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                tracing::debug!(task_id = id, "Update for removed task dropped");
                return false;
            };
            if task.is_terminal() {
                return false;
            }
            change(task);
            task.updated_at = Utc::now();
            if task.is_terminal() {
                prune_finished(&mut tasks);
            }
        }
        if persist {
            self.persist();
        }
        true
    }

    pub fn create(
        &self,
        kind: TaskKind,
        project_id: &str,
        file_id: Option<&str>,
        label: &str,
    ) -> TaskRecord {
        let task = TaskRecord::new(kind, project_id, file_id, label);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task.clone());
        self.persist();

        tracing::debug!(task_id = %task.id, kind = ?kind, project_id, "Task created");
        task
    }

    pub fn start(&self, id: &str, message: &str) -> bool {
        self.update(id, true, |task| {
            task.status = TaskStatus::Running;
            task.message = Some(message.to_string());
        })
    }

    /// In-memory only; the next status change writes it out
    pub fn progress(&self, id: &str, progress: u8, message: &str) -> bool {
        self.update(id, false, |task| {
            task.status = TaskStatus::Running;
            task.progress = progress.min(100);
            task.message = Some(message.to_string());
        })
    }

    pub fn complete(&self, id: &str, message: &str) -> bool {
        self.update(id, true, |task| {
            task.status = TaskStatus::Completed;
            task.progress = 100;
            task.message = Some(message.to_string());
        })
    }

    pub fn fail(&self, id: &str, error: &str) -> bool {
        self.update(id, true, |task| {
            task.status = TaskStatus::Failed;
            task.error = Some(error.to_string());
        })
    }

    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    /// Every task, newest first
    pub fn list(&self) -> Vec<TaskRecord> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.iter().rev().cloned().collect()
    }

    pub fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            tasks.len() != before
        };
        if removed {
            self.persist();
            tracing::info!(task_id = id, "Task removed");
        }
        removed
    }
}
