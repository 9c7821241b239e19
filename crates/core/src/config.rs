// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator configuration: file loading and runtime overrides.

use crate::event::ConfigChange;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Fields that may be changed at runtime via `update_config`.
///
/// Everything else (paths, rate limits, per-service concurrency) is
/// fixed at startup because workers and semaphores are built from it.
pub const RUNTIME_MUTABLE_FIELDS: &[&str] = &[
    "max_concurrency",
    "retry_attempts",
    "backoff_factor",
    "circuit_breaker_threshold",
    "circuit_breaker_timeout",
    "task_timeout",
];

/// Per-service token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Maximum tokens (burst size)
    pub capacity: u32,
    /// Tokens replenished per second
    pub refill_rate: f64,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Declarative orchestrator configuration.
///
/// Loaded from a JSON file at startup; the fields listed in
/// [`RUNTIME_MUTABLE_FIELDS`] can be overridden while running.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Upper bound of the worker pool
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Attempts per task, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Seconds; attempt `i` sleeps `factor * 2^i` before retrying
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Consecutive failures before a service's circuit opens
    #[serde(default = "default_circuit_threshold")]
    pub circuit_breaker_threshold: u32,
    /// Seconds before an open circuit admits a half-open probe
    #[serde(default = "default_circuit_timeout")]
    pub circuit_breaker_timeout: f64,
    /// Per-attempt handler timeout in seconds
    #[serde(default = "default_task_timeout")]
    pub task_timeout: f64,
    /// Service name -> token bucket parameters
    #[serde(default)]
    pub service_rate_limits: HashMap<String, RateLimit>,
    /// Service name -> max concurrently running tasks
    #[serde(default)]
    pub service_concurrency: HashMap<String, usize>,
    /// Seconds between autoscaler iterations
    #[serde(default = "default_autoscale_interval")]
    pub autoscale_interval: f64,
    /// Path of the write-ahead log
    pub wal_path: PathBuf,
    /// Path of the leader lock; defaults to `<wal_path>.lock`
    #[serde(default)]
    pub leader_lock_path: Option<PathBuf>,
    /// Local admin TCP port; 0 picks an ephemeral port, absent disables
    #[serde(default)]
    pub admin_port: Option<u16>,
    /// Daemon log file; absent logs to stderr
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

fn default_max_concurrency() -> usize {
    5
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_backoff_factor() -> f64 {
    0.5
}
fn default_circuit_threshold() -> u32 {
    5
}
fn default_circuit_timeout() -> f64 {
    30.0
}
fn default_task_timeout() -> f64 {
    30.0
}
fn default_autoscale_interval() -> f64 {
    0.5
}

impl OrchestratorConfig {
    /// Create a config with defaults for everything but the WAL path.
    pub fn new(wal_path: impl Into<PathBuf>) -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            retry_attempts: default_retry_attempts(),
            backoff_factor: default_backoff_factor(),
            circuit_breaker_threshold: default_circuit_threshold(),
            circuit_breaker_timeout: default_circuit_timeout(),
            task_timeout: default_task_timeout(),
            service_rate_limits: HashMap::new(),
            service_concurrency: HashMap::new(),
            autoscale_interval: default_autoscale_interval(),
            wal_path: wal_path.into(),
            leader_lock_path: None,
            admin_port: None,
            log_path: None,
        }
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Effective leader lock path: configured, or `<wal_path>.lock`.
    pub fn lock_path(&self) -> PathBuf {
        match &self.leader_lock_path {
            Some(path) => path.clone(),
            None => {
                let mut os = self.wal_path.clone().into_os_string();
                os.push(".lock");
                PathBuf::from(os)
            }
        }
    }

    /// Per-attempt timeout as a duration.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.task_timeout.max(0.0))
    }

    /// Backoff before retrying after failed attempt `attempt` (0-based):
    /// `backoff_factor * 2^attempt` seconds.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor.max(0.0) * 2f64.powi(attempt as i32);
        Duration::from_secs_f64(secs)
    }

    /// Cooldown before an open circuit admits a probe.
    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.circuit_breaker_timeout.max(0.0))
    }

    /// Delay between autoscaler iterations.
    pub fn autoscale_period(&self) -> Duration {
        Duration::from_secs_f64(self.autoscale_interval.max(0.001))
    }

    /// Apply runtime overrides, returning the old/new value of every
    /// field that was actually changed. Unknown keys and values of the
    /// wrong type are silently ignored.
    pub fn apply_overrides(
        &mut self,
        overrides: &serde_json::Map<String, serde_json::Value>,
    ) -> HashMap<String, ConfigChange> {
        let mut changes = HashMap::new();

        for (key, value) in overrides {
            let applied = match key.as_str() {
                "max_concurrency" => value.as_u64().map(|v| {
                    let old = serde_json::json!(self.max_concurrency);
                    self.max_concurrency = v as usize;
                    old
                }),
                "retry_attempts" => value.as_u64().map(|v| {
                    let old = serde_json::json!(self.retry_attempts);
                    self.retry_attempts = v as u32;
                    old
                }),
                "backoff_factor" => value.as_f64().map(|v| {
                    let old = serde_json::json!(self.backoff_factor);
                    self.backoff_factor = v;
                    old
                }),
                "circuit_breaker_threshold" => value.as_u64().map(|v| {
                    let old = serde_json::json!(self.circuit_breaker_threshold);
                    self.circuit_breaker_threshold = v as u32;
                    old
                }),
                "circuit_breaker_timeout" => value.as_f64().map(|v| {
                    let old = serde_json::json!(self.circuit_breaker_timeout);
                    self.circuit_breaker_timeout = v;
                    old
                }),
                "task_timeout" => value.as_f64().map(|v| {
                    let old = serde_json::json!(self.task_timeout);
                    self.task_timeout = v;
                    old
                }),
                _ => None,
            };

            if let Some(old) = applied {
                changes.insert(
                    key.clone(),
                    ConfigChange {
                        old,
                        new: value.clone(),
                    },
                );
            }
        }

        changes
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
