// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker loop: pull a task, enforce policy, invoke the service.
//!
//! Each worker runs until its token is cancelled. Worker cancellation is
//! cooperative: a worker finishes handling its current task before
//! exiting. Orchestrator shutdown additionally cancels the in-flight
//! handler via the shared shutdown token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stoker_core::{Clock, OrchestratorConfig, TaskId, TaskRecord, TaskStatus, WalEvent};
use stoker_storage::Wal;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::breaker::CircuitBreakers;
use crate::error::TaskError;
use crate::metrics::Metrics;
use crate::orchestrator::ConfigHandle;
use crate::queue::TaskQueue;
use crate::service::Service;
use crate::store::TaskStore;

/// Bounded wait per dequeue attempt, so workers notice cancellation.
pub(crate) const DEQUEUE_WAIT: Duration = Duration::from_millis(100);

/// Everything a worker needs, shared across the pool.
pub(crate) struct WorkerCtx<C: Clock> {
    pub config: ConfigHandle,
    pub store: Arc<TaskStore>,
    pub queue: Arc<TaskQueue>,
    pub wal: Arc<Mutex<Wal>>,
    pub services: Arc<HashMap<String, Arc<dyn Service>>>,
    pub breakers: Arc<CircuitBreakers<C>>,
    pub semaphores: Arc<HashMap<String, Arc<Semaphore>>>,
    pub running: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    pub metrics: Arc<Metrics>,
    pub clock: C,
    pub shutdown: CancellationToken,
    pub enqueue_seq: Arc<AtomicU64>,
}

impl<C: Clock> WorkerCtx<C> {
    pub(crate) fn append_status(&self, id: &TaskId, status: TaskStatus, end_time: Option<u64>) {
        let event = WalEvent::Status {
            task_id: id.clone(),
            status,
            end_time,
        };
        if let Err(e) = self.wal.lock().append(&event) {
            error!(task_id = %id, error = %e, "failed to append status to WAL");
        }
    }

    fn fail_task(&self, id: &TaskId, service: &str, err: &TaskError) {
        let end = self.clock.epoch_ms();
        if self.store.try_finish(id, TaskStatus::Failed, end) {
            self.append_status(id, TaskStatus::Failed, Some(end));
            self.metrics.incr_failed();
            error!(
                task_id = %id,
                service,
                class = err.class(),
                error = %err,
                "task_failed"
            );
        }
    }
}

/// Worker main loop.
pub(crate) async fn run<C: Clock + 'static>(ctx: Arc<WorkerCtx<C>>, token: CancellationToken) {
    debug!("worker started");
    loop {
        let task_id = tokio::select! {
            _ = token.cancelled() => break,
            id = ctx.queue.dequeue(DEQUEUE_WAIT) => match id {
                Some(id) => id,
                None => continue,
            },
        };
        process(&ctx, task_id).await;
        ctx.queue.task_done();
    }
    debug!("worker stopped");
}

async fn process<C: Clock + 'static>(ctx: &Arc<WorkerCtx<C>>, id: TaskId) {
    let config = ctx.config.snapshot();

    let Some(task) = ctx.store.get(&id) else {
        return;
    };
    if task.is_terminal() {
        // Cancelled while queued, or a stale entry: drop it
        return;
    }

    if task.deadline_elapsed(ctx.clock.epoch_ms()) {
        ctx.fail_task(&id, &task.service, &TaskError::DeadlineExceeded);
        return;
    }

    // Open circuit: the task is requeued, never failed
    if !ctx.breakers.allow(&task.service, config.circuit_cooldown()) {
        debug!(task_id = %id, service = %task.service, "circuit open, requeueing");
        ctx.metrics.incr_requeues();
        tokio::time::sleep(Duration::from_secs_f64(config.backoff_factor.max(0.0))).await;
        let seq = ctx.enqueue_seq.fetch_add(1, Ordering::SeqCst);
        ctx.queue.push(task.priority, seq, id);
        return;
    }

    let Some(service) = ctx.services.get(&task.service).map(Arc::clone) else {
        ctx.fail_task(
            &id,
            &task.service,
            &TaskError::UnknownService(task.service.clone()),
        );
        return;
    };

    // Register the cancel token before the running transition: a task
    // observed as running must always have a token a concurrent cancel
    // can fire
    let cancel = CancellationToken::new();
    ctx.running.lock().insert(id.clone(), cancel.clone());

    if !ctx.store.mark_running(&id, ctx.clock.epoch_ms()) {
        // Lost a race with cancel between the terminal check and here
        ctx.running.lock().remove(&id);
        return;
    }

    let outcome = execute(ctx, &config, service.as_ref(), &task, &cancel).await;

    ctx.running.lock().remove(&id);

    match outcome {
        Ok(result) => {
            let end = ctx.clock.epoch_ms();
            if ctx.store.finish_success(&id, result, end) {
                ctx.breakers.record_success(&task.service);
                ctx.append_status(&id, TaskStatus::Succeeded, Some(end));
                ctx.metrics.incr_succeeded();
                let retries = ctx.store.get(&id).map(|t| t.retries).unwrap_or(0);
                info!(task_id = %id, service = %task.service, retries, "task_succeeded");
            }
        }
        Err(TaskError::Cancelled) => {
            // Explicit cancel already set the terminal status and wrote
            // the WAL record. Shutdown leaves the task `running` in
            // memory with no terminal record, so the next start replays
            // it as pending (at-least-once).
            debug!(task_id = %id, service = %task.service, "task execution cancelled");
        }
        Err(err) => {
            ctx.fail_task(&id, &task.service, &err);
        }
    }
}

/// Acquire the per-service concurrency slot, then run with retry.
async fn execute<C: Clock>(
    ctx: &Arc<WorkerCtx<C>>,
    config: &OrchestratorConfig,
    service: &dyn Service,
    task: &TaskRecord,
    cancel: &CancellationToken,
) -> Result<serde_json::Value, TaskError> {
    let _permit = match ctx.semaphores.get(&task.service) {
        Some(sem) => {
            let sem = Arc::clone(sem);
            tokio::select! {
                _ = cancel.cancelled() => return Err(TaskError::Cancelled),
                _ = ctx.shutdown.cancelled() => return Err(TaskError::Cancelled),
                permit = sem.acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return Err(TaskError::Cancelled),
                },
            }
        }
        None => None,
    };

    execute_with_retry(ctx, config, service, task, cancel).await
}

/// Invoke the handler with per-attempt timeout, retrying with
/// exponential backoff up to `retry_attempts` total attempts.
///
/// The task deadline bounds total wall-clock: each attempt's timeout is
/// `min(task_timeout, deadline - now)`, and a non-positive remainder
/// aborts with `DeadlineExceeded` without retry.
async fn execute_with_retry<C: Clock>(
    ctx: &Arc<WorkerCtx<C>>,
    config: &OrchestratorConfig,
    service: &dyn Service,
    task: &TaskRecord,
    cancel: &CancellationToken,
) -> Result<serde_json::Value, TaskError> {
    let attempts = config.retry_attempts.max(1);
    let mut last = TaskError::AttemptTimeout;

    for attempt in 0..attempts {
        let timeout = attempt_timeout(config, task, &ctx.clock)?;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            _ = ctx.shutdown.cancelled() => return Err(TaskError::Cancelled),
            result = tokio::time::timeout(timeout, service.call(task.payload.clone())) => result,
        };

        match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => last = TaskError::Handler(e.to_string()),
            Err(_) => last = TaskError::AttemptTimeout,
        }

        ctx.store.incr_retries(&task.id);
        ctx.breakers
            .record_failure(&task.service, config.circuit_breaker_threshold);

        if attempt + 1 < attempts {
            let delay = config.backoff_delay(attempt);
            ctx.metrics.incr_retries();
            warn!(
                task_id = %task.id,
                service = %task.service,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %last,
                "task_retry"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(TaskError::Cancelled),
                _ = ctx.shutdown.cancelled() => return Err(TaskError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    Err(last)
}

/// Per-attempt timeout: `min(task_timeout, deadline - now)`.
fn attempt_timeout<C: Clock>(
    config: &OrchestratorConfig,
    task: &TaskRecord,
    clock: &C,
) -> Result<Duration, TaskError> {
    let base = config.attempt_timeout();
    match task.deadline {
        None => Ok(base),
        Some(deadline_ms) => {
            let now = clock.epoch_ms();
            if now >= deadline_ms {
                return Err(TaskError::DeadlineExceeded);
            }
            Ok(base.min(Duration::from_millis(deadline_ms - now)))
        }
    }
}
