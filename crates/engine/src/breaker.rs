// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service circuit breakers.
//!
//! A service accumulates consecutive failures; at the threshold its
//! circuit opens and dispatch is blocked until the cooldown elapses, at
//! which point one probe is admitted with a reset failure count.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use stoker_core::Clock;

/// Failure accumulator for a single service.
#[derive(Debug, Clone, Default)]
pub struct CircuitState {
    failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitState {
    /// Whether dispatch is allowed. An open circuit past its cooldown
    /// resets and admits the caller (half-open probe).
    pub fn allow(&mut self, cooldown: Duration, now: Instant) -> bool {
        match self.opened_at {
            None => true,
            Some(opened) => {
                if now.saturating_duration_since(opened) > cooldown {
                    self.failures = 0;
                    self.opened_at = None;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self, threshold: u32, now: Instant) {
        self.failures += 1;
        if self.failures >= threshold && self.opened_at.is_none() {
            self.opened_at = Some(now);
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }
}

/// Per-service circuit states, created on first use.
pub struct CircuitBreakers<C: Clock> {
    clock: C,
    states: Mutex<HashMap<String, CircuitState>>,
}

impl<C: Clock> CircuitBreakers<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow(&self, service: &str, cooldown: Duration) -> bool {
        let mut states = self.states.lock();
        states
            .entry(service.to_string())
            .or_default()
            .allow(cooldown, self.clock.now())
    }

    pub fn record_success(&self, service: &str) {
        let mut states = self.states.lock();
        states.entry(service.to_string()).or_default().record_success();
    }

    pub fn record_failure(&self, service: &str, threshold: u32) {
        let mut states = self.states.lock();
        states
            .entry(service.to_string())
            .or_default()
            .record_failure(threshold, self.clock.now());
    }

    /// Current consecutive-failure count for a service.
    pub fn failures(&self, service: &str) -> u32 {
        self.states
            .lock()
            .get(service)
            .map(CircuitState::failures)
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
