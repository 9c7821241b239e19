// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types surfaced by the engine.

use std::path::PathBuf;
use stoker_storage::WalError;
use thiserror::Error;

/// Errors returned by `Orchestrator::submit`.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The service's token bucket is exhausted; retry after the given
    /// number of seconds. Not persisted; the caller's concern.
    #[error("rate limited, retry after {retry_after:.2}s")]
    RateLimited { retry_after: f64 },

    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
}

/// Errors returned by `Orchestrator::start`.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("leader lock already held: {0}")]
    LockHeld(PathBuf),

    #[error("WAL unreadable: {0}")]
    Wal(#[from] WalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("orchestrator already running")]
    AlreadyRunning,
}

/// Per-task execution errors.
///
/// Recorded against the task and surfaced through its terminal status;
/// only the error class reaches the log stream, never the WAL.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("no handler registered for service '{0}'")]
    UnknownService(String),

    #[error("deadline elapsed before completion")]
    DeadlineExceeded,

    #[error("attempt exceeded task timeout")]
    AttemptTimeout,

    #[error("handler error: {0}")]
    Handler(String),

    #[error("cancelled")]
    Cancelled,
}

impl TaskError {
    /// Stable class name for structured log events.
    pub fn class(&self) -> &'static str {
        match self {
            TaskError::UnknownService(_) => "UnknownService",
            TaskError::DeadlineExceeded => "DeadlineExceeded",
            TaskError::AttemptTimeout => "AttemptTimeout",
            TaskError::Handler(_) => "HandlerError",
            TaskError::Cancelled => "Cancelled",
        }
    }
}
