// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL event types.
//!
//! Serializes with `{"event": "add" | "status" | "config_override", ...}`
//! format, one JSON object per WAL line.

use crate::task::{TaskId, TaskRecord, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single runtime-config override, recorded for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

/// Durable task-lifecycle events.
///
/// `Add` snapshots the full record at submission. `Status` records only
/// terminal transitions; `running` is an in-memory state and is never
/// logged, which is what makes recovery at-least-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WalEvent {
    Add {
        task: TaskRecord,
    },
    Status {
        task_id: TaskId,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_time: Option<u64>,
    },
    ConfigOverride {
        changes: HashMap<String, ConfigChange>,
    },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
