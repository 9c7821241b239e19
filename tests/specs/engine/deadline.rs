// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadlines and per-attempt timeouts.

use crate::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stoker_core::{Clock, SystemClock, TaskStatus};
use stoker_daemon::services::SleepService;
use stoker_engine::Orchestrator;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread")]
async fn deadline_bounds_a_slow_handler() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::new(test_config(&dir)).unwrap();
    orch.register(Arc::new(SleepService));
    orch.start().await.unwrap();

    // 1s of work against a 100ms deadline
    let deadline = SystemClock.epoch_ms() + 100;
    let started = Instant::now();
    let id = orch
        .submit("sleep", json!({"seconds": 1.0}), 0, Some(deadline))
        .unwrap();

    let status = wait_terminal(&orch, &id).await;
    orch.stop().await;

    assert_eq!(status, TaskStatus::Failed);
    // Failed at the deadline, far sooner than the handler would finish
    // all its attempts
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn elapsed_deadline_fails_without_invocation() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::new(test_config(&dir)).unwrap();
    let broken = Arc::new(AlwaysFail::new());
    orch.register(Arc::clone(&broken) as Arc<dyn stoker_engine::Service>);
    orch.start().await.unwrap();

    // Already in the past at submission
    let deadline = SystemClock.epoch_ms().saturating_sub(1_000);
    let id = orch
        .submit("broken", json!({}), 0, Some(deadline))
        .unwrap();

    let status = wait_terminal(&orch, &id).await;
    orch.stop().await;

    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(broken.calls(), 0, "handler must not be invoked");
    assert_eq!(orch.task(&id).unwrap().retries, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn tiny_task_timeout_exhausts_attempts() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.task_timeout = 0.02;
    config.retry_attempts = 2;
    let orch = Orchestrator::new(config).unwrap();
    orch.register(Arc::new(SleepService));
    orch.start().await.unwrap();

    let id = orch
        .submit("sleep", json!({"seconds": 1.0}), 0, None)
        .unwrap();

    let status = wait_terminal(&orch, &id).await;
    orch.stop().await;

    assert_eq!(status, TaskStatus::Failed);
    // Both attempts timed out
    assert_eq!(orch.task(&id).unwrap().retries, 2);
}
