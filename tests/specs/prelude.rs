// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for behavioral specs.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use stoker_core::{OrchestratorConfig, TaskId, TaskStatus};
use stoker_engine::{Orchestrator, Service, ServiceError};
use tempfile::TempDir;

/// Config tuned for fast tests: no backoff, quick autoscaling.
pub fn test_config(dir: &TempDir) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::new(dir.path().join("events.wal"));
    config.autoscale_interval = 0.02;
    config.backoff_factor = 0.0;
    config.task_timeout = 5.0;
    config
}

/// Fails the first `failures` calls, then echoes the payload.
pub struct FailNTimes {
    failures: u32,
    calls: AtomicU32,
}

impl FailNTimes {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for FailNTimes {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn call(&self, payload: Value) -> Result<Value, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(ServiceError::new(format!("transient failure {call}")))
        } else {
            Ok(payload)
        }
    }
}

/// Always fails, counting invocations.
pub struct AlwaysFail {
    calls: AtomicU32,
}

impl AlwaysFail {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for AlwaysFail {
    fn name(&self) -> &str {
        "broken"
    }

    async fn call(&self, _payload: Value) -> Result<Value, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::new("permanent failure"))
    }
}

/// Poll until the task reaches a terminal status (5s cap).
pub async fn wait_terminal(orch: &Orchestrator, id: &TaskId) -> TaskStatus {
    wait_terminal_within(orch, id, Duration::from_secs(5)).await
}

pub async fn wait_terminal_within(
    orch: &Orchestrator,
    id: &TaskId,
    timeout: Duration,
) -> TaskStatus {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(task) = orch.task(id) {
            if task.status.is_terminal() {
                return task.status;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} did not reach a terminal status within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the task is observed `Running` (5s cap).
pub async fn wait_running(orch: &Orchestrator, id: &TaskId) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match orch.task(id).map(|t| t.status) {
            Some(TaskStatus::Running) => return,
            Some(status) if status.is_terminal() => {
                panic!("task {id} reached {status} before running was observed")
            }
            _ => {}
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} never started running"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
