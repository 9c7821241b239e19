// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation of pending and running tasks.

use crate::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stoker_core::TaskStatus;
use stoker_daemon::services::SleepService;
use stoker_engine::Orchestrator;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread")]
async fn cancel_running_task_interrupts_handler() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::new(test_config(&dir)).unwrap();
    orch.register(Arc::new(SleepService));
    orch.start().await.unwrap();

    let id = orch
        .submit("sleep", json!({"seconds": 0.5}), 0, None)
        .unwrap();
    wait_running(&orch, &id).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let cancelled_at = Instant::now();
    assert!(orch.cancel(&id));

    let status = wait_terminal(&orch, &id).await;
    assert_eq!(status, TaskStatus::Cancelled);

    // The handler was interrupted, not run to completion: the worker
    // frees up well before the 0.5s sleep would have finished
    tokio::time::timeout(Duration::from_millis(300), orch.join())
        .await
        .expect("worker still busy after cancel");
    assert!(cancelled_at.elapsed() < Duration::from_millis(400));
    orch.stop().await;

    assert_eq!(orch.task(&id).unwrap().status, TaskStatus::Cancelled);
    assert!(orch.task(&id).unwrap().end_time.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_running_task_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.retry_attempts = 5;
    let orch = Orchestrator::new(config).unwrap();
    orch.register(Arc::new(SleepService));
    orch.start().await.unwrap();

    let id = orch
        .submit("sleep", json!({"seconds": 0.3}), 0, None)
        .unwrap();
    wait_running(&orch, &id).await;
    orch.cancel(&id);

    let status = wait_terminal(&orch, &id).await;
    orch.stop().await;

    assert_eq!(status, TaskStatus::Cancelled);
    assert_eq!(orch.task(&id).unwrap().retries, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_pending_task_skips_execution() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.max_concurrency = 1;
    let orch = Orchestrator::new(config).unwrap();
    orch.register(Arc::new(SleepService));

    // Queue two tasks before starting; cancel the second while pending
    let first = orch
        .submit("sleep", json!({"seconds": 0.2}), 0, None)
        .unwrap();
    let second = orch
        .submit("sleep", json!({"seconds": 0.2}), 0, None)
        .unwrap();
    assert!(orch.cancel(&second));
    assert_eq!(orch.task(&second).unwrap().status, TaskStatus::Cancelled);

    orch.start().await.unwrap();
    orch.join().await;
    orch.stop().await;

    // The cancelled task never ran
    assert_eq!(orch.task(&first).unwrap().status, TaskStatus::Succeeded);
    let second_task = orch.task(&second).unwrap();
    assert_eq!(second_task.status, TaskStatus::Cancelled);
    assert!(second_task.start_time.is_none());
}
