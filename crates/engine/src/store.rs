// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory task store.
//!
//! Map of task id to record, reconstructed from the WAL on start. All
//! terminal transitions funnel through [`TaskStore::try_finish`], the
//! single place that enforces "terminal statuses never change". Under
//! a cancel/complete race exactly one caller wins.

use parking_lot::RwLock;
use std::collections::HashMap;
use stoker_core::{TaskId, TaskRecord, TaskStatus};

/// Shared map of task records.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: TaskRecord) {
        self.tasks.write().insert(record.id.clone(), record);
    }

    pub fn remove(&self, id: &TaskId) {
        self.tasks.write().remove(id);
    }

    pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.tasks.read().get(id).cloned()
    }

    pub fn status_of(&self, id: &TaskId) -> Option<TaskStatus> {
        self.tasks.read().get(id).map(|t| t.status)
    }

    /// Per-task statuses keyed by id string, for status snapshots.
    pub fn statuses(&self) -> HashMap<String, TaskStatus> {
        self.tasks
            .read()
            .values()
            .map(|t| (t.id.to_string(), t.status))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Transition `Pending -> Running`, stamping the start time on the
    /// first transition. Returns false if the task is missing or not
    /// pending (e.g. cancelled while queued).
    pub fn mark_running(&self, id: &TaskId, now_ms: u64) -> bool {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };
        if task.status != TaskStatus::Pending {
            return false;
        }
        task.status = TaskStatus::Running;
        if task.start_time.is_none() {
            task.start_time = Some(now_ms);
        }
        true
    }

    /// Transition to a terminal status. Returns false (and changes
    /// nothing) if the task is missing or already terminal.
    pub fn try_finish(&self, id: &TaskId, status: TaskStatus, end_ms: u64) -> bool {
        debug_assert!(status.is_terminal());
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };
        if task.is_terminal() {
            return false;
        }
        task.status = status;
        task.end_time = Some(end_ms);
        true
    }

    /// Terminal success: stores the result alongside the transition.
    pub fn finish_success(&self, id: &TaskId, result: serde_json::Value, end_ms: u64) -> bool {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };
        if task.is_terminal() {
            return false;
        }
        task.status = TaskStatus::Succeeded;
        task.result = Some(result);
        task.end_time = Some(end_ms);
        true
    }

    pub fn incr_retries(&self, id: &TaskId) {
        if let Some(task) = self.tasks.write().get_mut(id) {
            task.retries += 1;
        }
    }

    /// Replace the whole map (WAL recovery).
    pub fn replace(&self, tasks: HashMap<TaskId, TaskRecord>) {
        *self.tasks.write() = tasks;
    }

    /// Snapshot of every record, for recovery bookkeeping and tests.
    pub fn all(&self) -> Vec<TaskRecord> {
        self.tasks.read().values().cloned().collect()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
