// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Submission through success/failure, retries, and WAL contents.

use crate::prelude::*;
use serde_json::json;
use std::sync::Arc;
use stoker_core::{TaskStatus, WalEvent};
use stoker_daemon::services::EchoService;
use stoker_engine::Orchestrator;
use stoker_storage::Wal;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread")]
async fn echo_task_succeeds_with_verbatim_result() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::new(test_config(&dir)).unwrap();
    orch.register(Arc::new(EchoService));
    orch.start().await.unwrap();

    let id = orch.submit("echo", json!({"v": 1}), 0, None).unwrap();
    orch.join().await;
    orch.stop().await;

    let task = orch.task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(task.result, Some(json!({"v": 1})));
    assert_eq!(task.retries, 0);
    assert!(task.start_time.is_some());
    assert!(task.end_time.is_some());

    // WAL holds exactly one add and one terminal status
    let events = Wal::open(&dir.path().join("events.wal"))
        .unwrap()
        .load()
        .unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], WalEvent::Add { task } if task.id == id));
    assert!(matches!(
        &events[1],
        WalEvent::Status { task_id, status: TaskStatus::Succeeded, .. } if *task_id == id
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failure_retries_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::new(test_config(&dir)).unwrap();
    let flaky = Arc::new(FailNTimes::new(1));
    orch.register(Arc::clone(&flaky) as Arc<dyn stoker_engine::Service>);
    orch.start().await.unwrap();

    let id = orch.submit("flaky", json!({"ok": true}), 0, None).unwrap();
    let status = wait_terminal(&orch, &id).await;
    orch.stop().await;

    assert_eq!(status, TaskStatus::Succeeded);
    assert_eq!(flaky.calls(), 2);
    assert_eq!(orch.task(&id).unwrap().retries, 1);
    assert_eq!(orch.task(&id).unwrap().result, Some(json!({"ok": true})));
}

#[tokio::test(flavor = "multi_thread")]
async fn persistent_failure_exhausts_retries() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.retry_attempts = 2;
    let orch = Orchestrator::new(config).unwrap();
    let broken = Arc::new(AlwaysFail::new());
    orch.register(Arc::clone(&broken) as Arc<dyn stoker_engine::Service>);
    orch.start().await.unwrap();

    let id = orch.submit("broken", json!({}), 0, None).unwrap();
    let status = wait_terminal(&orch, &id).await;
    orch.stop().await;

    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(broken.calls(), 2);
    assert!(orch.circuit_failures("broken") >= 2);

    // Terminal failure is durable
    let events = Wal::open(&dir.path().join("events.wal"))
        .unwrap()
        .load()
        .unwrap();
    assert!(matches!(
        events.last(),
        Some(WalEvent::Status { status: TaskStatus::Failed, .. })
    ));
}
