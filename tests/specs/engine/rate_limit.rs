// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service submission rate limiting.

use crate::prelude::*;
use serde_json::json;
use std::time::Duration;
use stoker_core::RateLimit;
use stoker_engine::{Orchestrator, SubmitError};
use tempfile::TempDir;

fn limited_config(dir: &TempDir) -> stoker_core::OrchestratorConfig {
    let mut config = test_config(dir);
    config.service_rate_limits.insert(
        "echo".to_string(),
        RateLimit {
            capacity: 1,
            refill_rate: 5.0,
        },
    );
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn burst_beyond_capacity_is_rejected_with_retry_after() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::new(limited_config(&dir)).unwrap();

    // Capacity 1: the first submission drains the bucket
    orch.submit("echo", json!({}), 0, None).unwrap();

    let err = orch.submit("echo", json!({}), 0, None).unwrap_err();
    match err {
        SubmitError::RateLimited { retry_after } => {
            // One token at 5/s: roughly 0.2s away
            assert!(
                (0.05..=0.25).contains(&retry_after),
                "retry_after = {retry_after}"
            );
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // After waiting out the refill the bucket admits again
    tokio::time::sleep(Duration::from_millis(250)).await;
    orch.submit("echo", json!({}), 0, None).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_submission_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::new(limited_config(&dir)).unwrap();

    orch.submit("echo", json!({}), 0, None).unwrap();
    let _ = orch.submit("echo", json!({}), 0, None).unwrap_err();

    // RateLimited is the caller's concern: no record, no WAL entry
    let status = orch.status();
    assert_eq!(status.tasks.len(), 1);
    assert_eq!(status.queue, 1);

    let events = stoker_storage::Wal::open(&dir.path().join("events.wal"))
        .unwrap()
        .load()
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn other_services_are_unaffected() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::new(limited_config(&dir)).unwrap();

    orch.submit("echo", json!({}), 0, None).unwrap();
    assert!(orch.submit("echo", json!({}), 0, None).is_err());

    // "arith" has no bucket configured
    for _ in 0..20 {
        orch.submit("arith", json!({"x": 1, "y": 2}), 0, None).unwrap();
    }
}
