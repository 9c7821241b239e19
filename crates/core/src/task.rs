// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier, status machine, and durable task record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a submitted task.
///
/// Generated at submission time and used to key the task in the store,
/// the queue, the WAL, and log events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a task.
///
/// `Succeeded`, `Failed`, and `Cancelled` are terminal: once a task
/// reaches one of them its status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// In the queue, waiting for a worker
    Pending,
    /// Held by a worker, handler may be executing
    Running,
    /// Handler returned a result
    Succeeded,
    /// Retries exhausted, deadline elapsed, or service unknown
    Failed,
    /// Cancelled before or during execution
    Cancelled,
}

impl TaskStatus {
    /// Check whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Durable record of a single task.
///
/// Snapshotted into the WAL on submission; timestamps are epoch
/// milliseconds. `enqueue_seq` is the tiebreaker that keeps dispatch
/// FIFO within a priority level (it may be reassigned on recovery).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub service: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub enqueue_seq: u64,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,
}

impl TaskRecord {
    /// Create a new pending task record.
    pub fn new(
        id: TaskId,
        service: impl Into<String>,
        payload: serde_json::Value,
        priority: i64,
        deadline: Option<u64>,
    ) -> Self {
        Self {
            id,
            service: service.into(),
            payload,
            priority,
            enqueue_seq: 0,
            status: TaskStatus::Pending,
            result: None,
            retries: 0,
            start_time: None,
            end_time: None,
            deadline,
        }
    }

    /// Check whether the task has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check whether the deadline (if any) has elapsed at `now_ms`.
    pub fn deadline_elapsed(&self, now_ms: u64) -> bool {
        self.deadline.is_some_and(|d| now_ms > d)
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
