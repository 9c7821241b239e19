// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in services.
//!
//! A packaged daemon needs something to dispatch to out of the box;
//! these cover smoke tests and demos. Real deployments register their
//! own handlers before `start()`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use stoker_core::Clock;
use stoker_engine::{Orchestrator, Service, ServiceError};

/// Returns the payload verbatim.
pub struct EchoService;

#[async_trait]
impl Service for EchoService {
    fn name(&self) -> &str {
        "echo"
    }

    async fn call(&self, payload: Value) -> Result<Value, ServiceError> {
        Ok(payload)
    }
}

/// Sleeps for `{"seconds": f64}`, useful for exercising timeouts and
/// cancellation.
pub struct SleepService;

#[async_trait]
impl Service for SleepService {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn call(&self, payload: Value) -> Result<Value, ServiceError> {
        let seconds = payload
            .get("seconds")
            .and_then(Value::as_f64)
            .ok_or_else(|| ServiceError::new("missing numeric field 'seconds'"))?;
        if !(0.0..=3600.0).contains(&seconds) {
            return Err(ServiceError::new("'seconds' out of range"));
        }
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(json!({"slept": seconds}))
    }
}

/// Adds `{"x": n, "y": n}`.
pub struct ArithService;

#[async_trait]
impl Service for ArithService {
    fn name(&self) -> &str {
        "arith"
    }

    async fn call(&self, payload: Value) -> Result<Value, ServiceError> {
        let x = payload
            .get("x")
            .and_then(Value::as_i64)
            .ok_or_else(|| ServiceError::new("missing integer field 'x'"))?;
        let y = payload
            .get("y")
            .and_then(Value::as_i64)
            .ok_or_else(|| ServiceError::new("missing integer field 'y'"))?;
        Ok(json!({"sum": x + y}))
    }
}

/// Register every built-in service.
pub fn register_builtins<C: Clock + 'static>(orch: &Orchestrator<C>) {
    orch.register(std::sync::Arc::new(EchoService));
    orch.register(std::sync::Arc::new(SleepService));
    orch.register(std::sync::Arc::new(ArithService));
}

#[cfg(test)]
#[path = "services_tests.rs"]
mod tests;
