// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch ordering: strict priority, FIFO within a priority level.

use crate::prelude::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use stoker_engine::{Orchestrator, Service, ServiceError};
use tempfile::TempDir;

/// Records the order payload labels arrive in.
struct RecordingService {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Service for RecordingService {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn call(&self, payload: Value) -> Result<Value, ServiceError> {
        let label = payload
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        self.seen.lock().push(label);
        Ok(payload)
    }
}

async fn run_ordering(submissions: &[(&str, i64)]) -> Vec<String> {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    // One worker so dispatch order is observable
    config.max_concurrency = 1;
    let orch = Orchestrator::new(config).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    orch.register(Arc::new(RecordingService {
        seen: Arc::clone(&seen),
    }));

    // Submit before starting so the whole batch is queued when the
    // first worker comes up
    for (label, priority) in submissions {
        orch.submit("recorder", json!({"label": label}), *priority, None)
            .unwrap();
    }

    orch.start().await.unwrap();
    orch.join().await;
    orch.stop().await;

    let result = seen.lock().clone();
    result
}

#[tokio::test(flavor = "multi_thread")]
async fn lower_priority_value_dispatches_first() {
    let order = run_ordering(&[("a", 10), ("b", 1)]).await;
    assert_eq!(order, vec!["b", "a"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn equal_priority_dispatches_in_submission_order() {
    let order = run_ordering(&[("first", 0), ("second", 0), ("third", 0)]).await;
    assert_eq!(order, vec!["first", "second", "third"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn strict_priority_beats_age() {
    let order = run_ordering(&[("old-low", 5), ("older-low", 5), ("new-high", -1)]).await;
    assert_eq!(order, vec!["new-high", "old-low", "older-low"]);
}
