// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service handler trait.
//!
//! A service is a named async handler. Handlers are registered with the
//! orchestrator before start and invoked by workers with the task's
//! payload. Dropping the returned future cancels the handler.

use async_trait::async_trait;
use thiserror::Error;

/// Error raised by a service handler.
///
/// Opaque to the engine: the message is logged, counted by the circuit
/// breaker, and retried like any other attempt failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ServiceError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ServiceError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// A named async task handler.
#[async_trait]
pub trait Service: Send + Sync {
    /// Name the service registers under.
    fn name(&self) -> &str;

    /// Handle one task payload.
    async fn call(&self, payload: serde_json::Value) -> Result<serde_json::Value, ServiceError>;
}
