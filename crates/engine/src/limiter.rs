// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service token bucket rate limiting.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;
use stoker_core::{Clock, RateLimit};

/// Standard token bucket: refilled lazily on each consume.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    updated: Instant,
}

impl TokenBucket {
    pub fn new(limit: RateLimit, now: Instant) -> Self {
        Self {
            capacity: f64::from(limit.capacity),
            refill_rate: limit.refill_rate,
            tokens: f64::from(limit.capacity),
            updated: now,
        }
    }

    /// Consume `amount` tokens.
    ///
    /// Returns `Err(retry_after_seconds)` when the bucket cannot cover
    /// the request; with a zero refill rate the wait is infinite.
    pub fn consume(&mut self, amount: f64, now: Instant) -> Result<(), f64> {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.updated = now;
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);

        if self.tokens >= amount {
            self.tokens -= amount;
            return Ok(());
        }

        let needed = amount - self.tokens;
        if self.refill_rate > 0.0 {
            Err(needed / self.refill_rate)
        } else {
            Err(f64::INFINITY)
        }
    }
}

/// Per-service buckets, created eagerly from config.
///
/// Services without a configured limit are never throttled.
pub struct RateLimiters<C: Clock> {
    clock: C,
    buckets: HashMap<String, Mutex<TokenBucket>>,
}

impl<C: Clock> RateLimiters<C> {
    pub fn new(clock: C, limits: &HashMap<String, RateLimit>) -> Self {
        let now = clock.now();
        let buckets = limits
            .iter()
            .map(|(name, limit)| (name.clone(), Mutex::new(TokenBucket::new(*limit, now))))
            .collect();
        Self { clock, buckets }
    }

    /// Take one token for a submission to `service`.
    pub fn check(&self, service: &str) -> Result<(), f64> {
        match self.buckets.get(service) {
            Some(bucket) => bucket.lock().consume(1.0, self.clock.now()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
