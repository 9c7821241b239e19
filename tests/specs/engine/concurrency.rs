// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service concurrency caps.

use crate::prelude::*;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stoker_core::TaskStatus;
use stoker_engine::{Orchestrator, Service, ServiceError};
use tempfile::TempDir;

/// Tracks the highest number of concurrent calls observed.
struct GaugeService {
    current: AtomicI32,
    peak: AtomicI32,
}

impl GaugeService {
    fn new() -> Self {
        Self {
            current: AtomicI32::new(0),
            peak: AtomicI32::new(0),
        }
    }

    fn peak(&self) -> i32 {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for GaugeService {
    fn name(&self) -> &str {
        "gauge"
    }

    async fn call(&self, payload: Value) -> Result<Value, ServiceError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(payload)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn service_concurrency_cap_is_enforced() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    // Plenty of workers, but "gauge" may only run one task at a time
    config.max_concurrency = 4;
    config.service_concurrency.insert("gauge".to_string(), 1);
    let orch = Orchestrator::new(config).unwrap();

    let gauge = Arc::new(GaugeService::new());
    orch.register(Arc::clone(&gauge) as Arc<dyn Service>);

    for _ in 0..8 {
        orch.submit("gauge", json!({}), 0, None).unwrap();
    }

    orch.start().await.unwrap();
    orch.join().await;
    orch.stop().await;

    assert_eq!(gauge.peak(), 1);
    assert!(orch
        .status()
        .tasks
        .values()
        .all(|s| *s == TaskStatus::Succeeded));
}

#[tokio::test(flavor = "multi_thread")]
async fn uncapped_service_uses_the_whole_pool() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.max_concurrency = 4;
    let orch = Orchestrator::new(config).unwrap();

    let gauge = Arc::new(GaugeService::new());
    orch.register(Arc::clone(&gauge) as Arc<dyn Service>);

    for _ in 0..12 {
        orch.submit("gauge", json!({}), 0, None).unwrap();
    }

    orch.start().await.unwrap();
    orch.join().await;
    orch.stop().await;

    // With a deep queue and no cap, the autoscaler brings more than
    // one worker to bear
    assert!(gauge.peak() > 1, "peak = {}", gauge.peak());
}
