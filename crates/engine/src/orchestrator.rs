// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator facade.
//!
//! Composes the WAL, leader lock, priority queue, rate limiters,
//! circuit breakers, and worker pool. Lifecycle:
//!
//! - `start()` acquires the leader lock, replays the WAL (non-terminal
//!   tasks become pending and are re-enqueued), spawns one worker and
//!   the autoscaler.
//! - `stop()` cancels workers and the autoscaler, waits for them, and
//!   releases the lock. In-flight handlers receive cancellation.
//!
//! Submission, cancellation, status, and config overrides are available
//! whether or not the orchestrator is started; dispatch only happens
//! while running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use stoker_core::{
    Clock, ConfigChange, IdGen, OrchestratorConfig, SystemClock, TaskId, TaskRecord, TaskStatus,
    UuidIdGen, WalEvent,
};
use stoker_storage::{LeaderLock, LockError, Wal};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::breaker::CircuitBreakers;
use crate::error::{StartError, SubmitError};
use crate::limiter::RateLimiters;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pool::{self, WorkerPool};
use crate::queue::TaskQueue;
use crate::service::Service;
use crate::store::TaskStore;
use crate::worker::WorkerCtx;

/// Copy-on-write handle to the live configuration.
///
/// Readers take a cheap `Arc` snapshot; `apply_overrides` builds a new
/// config and swaps it atomically.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<OrchestratorConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<OrchestratorConfig> {
        Arc::clone(&self.inner.read())
    }

    pub fn apply_overrides(
        &self,
        overrides: &serde_json::Map<String, serde_json::Value>,
    ) -> HashMap<String, ConfigChange> {
        let mut guard = self.inner.write();
        let mut next = (**guard).clone();
        let changes = next.apply_overrides(overrides);
        if !changes.is_empty() {
            *guard = Arc::new(next);
        }
        changes
    }

    /// Record the port the admin endpoint actually bound (port 0 picks
    /// an ephemeral one).
    pub fn set_admin_port(&self, port: u16) {
        let mut guard = self.inner.write();
        let mut next = (**guard).clone();
        next.admin_port = Some(port);
        *guard = Arc::new(next);
    }
}

/// Read-only view of queue depth and per-task status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub queue: usize,
    pub tasks: HashMap<String, TaskStatus>,
}

/// Resources that exist only while the orchestrator is running.
struct RunState<C: Clock> {
    shutdown: CancellationToken,
    pool: Arc<WorkerPool<C>>,
    autoscaler: JoinHandle<()>,
    leader: LeaderLock,
}

/// Durable task orchestrator: single leader, WAL-backed, dynamically
/// scaled worker pool.
pub struct Orchestrator<C: Clock = SystemClock> {
    config: ConfigHandle,
    clock: C,
    services: Mutex<HashMap<String, Arc<dyn Service>>>,
    store: Arc<TaskStore>,
    queue: Arc<TaskQueue>,
    wal: Arc<Mutex<Wal>>,
    limiters: RateLimiters<C>,
    breakers: Arc<CircuitBreakers<C>>,
    semaphores: Arc<HashMap<String, Arc<Semaphore>>>,
    running: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    metrics: Arc<Metrics>,
    enqueue_seq: Arc<AtomicU64>,
    id_gen: UuidIdGen,
    run_state: Mutex<Option<RunState<C>>>,
}

impl Orchestrator<SystemClock> {
    /// Create an orchestrator on the system clock.
    pub fn new(config: OrchestratorConfig) -> Result<Self, StartError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + 'static> Orchestrator<C> {
    /// Create an orchestrator with an explicit clock.
    ///
    /// Opens (creating if needed) the WAL; per-service token buckets
    /// and semaphores are built eagerly from the config.
    pub fn with_clock(config: OrchestratorConfig, clock: C) -> Result<Self, StartError> {
        let wal = Wal::open(&config.wal_path)?;
        let limiters = RateLimiters::new(clock.clone(), &config.service_rate_limits);
        let semaphores: HashMap<String, Arc<Semaphore>> = config
            .service_concurrency
            .iter()
            .map(|(name, limit)| (name.clone(), Arc::new(Semaphore::new((*limit).max(1)))))
            .collect();

        Ok(Self {
            config: ConfigHandle::new(config),
            clock: clock.clone(),
            services: Mutex::new(HashMap::new()),
            store: Arc::new(TaskStore::new()),
            queue: Arc::new(TaskQueue::new()),
            wal: Arc::new(Mutex::new(wal)),
            limiters,
            breakers: Arc::new(CircuitBreakers::new(clock)),
            semaphores: Arc::new(semaphores),
            running: Arc::new(Mutex::new(HashMap::new())),
            metrics: Arc::new(Metrics::new()),
            enqueue_seq: Arc::new(AtomicU64::new(0)),
            id_gen: UuidIdGen,
            run_state: Mutex::new(None),
        })
    }

    /// Register a service handler under its declared name.
    ///
    /// Call before `start()`; workers snapshot the registry at start.
    pub fn register(&self, service: Arc<dyn Service>) {
        let name = service.name().to_string();
        self.services.lock().insert(name, service);
    }

    /// Live configuration snapshot.
    pub fn config(&self) -> Arc<OrchestratorConfig> {
        self.config.snapshot()
    }

    /// Handle for components (admin endpoint) that mutate config.
    pub fn config_handle(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Consecutive-failure count currently recorded against a service.
    pub fn circuit_failures(&self, service: &str) -> u32 {
        self.breakers.failures(service)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Whether `start()` has run without a matching `stop()`.
    pub fn is_running(&self) -> bool {
        self.run_state.lock().is_some()
    }

    /// Current live worker count (0 when stopped).
    pub fn worker_count(&self) -> usize {
        self.run_state
            .lock()
            .as_ref()
            .map(|state| state.pool.worker_count())
            .unwrap_or(0)
    }

    /// Submit a task for `service`.
    ///
    /// Checks the service's token bucket, creates the record, appends
    /// the durable `add` event, then enqueues. Returns the task id.
    pub fn submit(
        &self,
        service: &str,
        payload: serde_json::Value,
        priority: i64,
        deadline: Option<u64>,
    ) -> Result<TaskId, SubmitError> {
        if let Err(retry_after) = self.limiters.check(service) {
            warn!(service, retry_after, "submission rate limited");
            return Err(SubmitError::RateLimited { retry_after });
        }

        let id = TaskId::new(self.id_gen.next());
        let seq = self.enqueue_seq.fetch_add(1, Ordering::SeqCst);
        let mut record = TaskRecord::new(id.clone(), service, payload, priority, deadline);
        record.enqueue_seq = seq;

        self.store.insert(record.clone());
        if let Err(e) = self.wal.lock().append(&WalEvent::Add { task: record }) {
            // Not durable: withdraw the record entirely
            self.store.remove(&id);
            return Err(e.into());
        }

        self.queue.push(priority, seq, id.clone());
        self.metrics.incr_submitted();
        info!(task_id = %id, service, priority, "task_submitted");
        Ok(id)
    }

    /// Cancel a task.
    ///
    /// Pending tasks are marked cancelled and discarded when dequeued;
    /// running tasks additionally have their in-flight handler
    /// cancelled. Returns false for terminal or unknown tasks.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let end = self.clock.epoch_ms();
        if !self.store.try_finish(id, TaskStatus::Cancelled, end) {
            return false;
        }

        if let Some(token) = self.running.lock().get(id) {
            token.cancel();
        }

        let event = WalEvent::Status {
            task_id: id.clone(),
            status: TaskStatus::Cancelled,
            end_time: Some(end),
        };
        if let Err(e) = self.wal.lock().append(&event) {
            error!(task_id = %id, error = %e, "failed to append cancellation to WAL");
        }

        self.metrics.incr_cancelled();
        info!(task_id = %id, "task_cancelled");
        true
    }

    /// Block until the queue is drained and no tasks are running.
    pub async fn join(&self) {
        self.queue.join().await;
    }

    /// Full record of a single task, if known.
    pub fn task(&self, id: &TaskId) -> Option<TaskRecord> {
        self.store.get(id)
    }

    /// Read-only snapshot of queue depth and per-task status.
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            queue: self.queue.len(),
            tasks: self.store.statuses(),
        }
    }

    /// Atomically apply runtime-mutable overrides.
    ///
    /// The `config_override` WAL record is appended synchronously, so
    /// an acknowledged override is durable even across an immediate
    /// shutdown. Unknown keys are silently ignored.
    pub fn update_config(
        &self,
        overrides: &serde_json::Map<String, serde_json::Value>,
    ) -> HashMap<String, ConfigChange> {
        let changes = self.config.apply_overrides(overrides);
        if changes.is_empty() {
            return changes;
        }

        let event = WalEvent::ConfigOverride {
            changes: changes.clone(),
        };
        if let Err(e) = self.wal.lock().append(&event) {
            error!(error = %e, "failed to append config override to WAL");
        }

        let keys: Vec<&String> = changes.keys().collect();
        info!(?keys, "config_override");
        changes
    }

    /// Acquire leadership, recover from the WAL, and begin dispatching.
    pub async fn start(&self) -> Result<(), StartError> {
        let mut run_state = self.run_state.lock();
        if run_state.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        let config = self.config.snapshot();
        let leader = LeaderLock::acquire(&config.lock_path()).map_err(|e| match e {
            LockError::Held(path) => StartError::LockHeld(path),
            LockError::Io(e) => StartError::Io(e),
        })?;

        let events = self.wal.lock().load()?;
        self.recover(events);

        let shutdown = CancellationToken::new();
        let services = Arc::new(self.services.lock().clone());
        let ctx = Arc::new(WorkerCtx {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            wal: Arc::clone(&self.wal),
            services,
            breakers: Arc::clone(&self.breakers),
            semaphores: Arc::clone(&self.semaphores),
            running: Arc::clone(&self.running),
            metrics: Arc::clone(&self.metrics),
            clock: self.clock.clone(),
            shutdown: shutdown.clone(),
            enqueue_seq: Arc::clone(&self.enqueue_seq),
        });

        let pool = Arc::new(WorkerPool::new(ctx));
        pool.scale_to(1);
        let autoscaler = tokio::spawn(pool::run_autoscaler(Arc::clone(&pool), shutdown.clone()));

        *run_state = Some(RunState {
            shutdown,
            pool,
            autoscaler,
            leader,
        });

        info!(
            tasks = self.store.len(),
            queue = self.queue.len(),
            "orchestrator started"
        );
        Ok(())
    }

    /// Stop dispatching: cancel the autoscaler and all workers, wait
    /// for them to wind down, release the leader lock.
    pub async fn stop(&self) {
        let state = self.run_state.lock().take();
        let Some(state) = state else {
            return;
        };

        info!("stopping orchestrator");
        state.shutdown.cancel();
        let _ = state.autoscaler.await;
        state.pool.shutdown().await;
        drop(state.leader);

        let metrics = self.metrics.snapshot();
        info!(
            submitted = metrics.submitted,
            succeeded = metrics.succeeded,
            failed = metrics.failed,
            cancelled = metrics.cancelled,
            "orchestrator stopped"
        );
    }

    /// Rebuild the store and queue from WAL events.
    ///
    /// Later `status` events win unless the task is already terminal
    /// (terminal statuses observed in the WAL are authoritative). Every
    /// surviving non-terminal task is reset to pending and re-enqueued
    /// in original submission order with a fresh `enqueue_seq`.
    fn recover(&self, events: Vec<WalEvent>) {
        let mut tasks: HashMap<TaskId, TaskRecord> = HashMap::new();
        let mut add_order: Vec<TaskId> = Vec::new();

        for event in events {
            match event {
                WalEvent::Add { task } => {
                    if !tasks.contains_key(&task.id) {
                        add_order.push(task.id.clone());
                    }
                    tasks.insert(task.id.clone(), task);
                }
                WalEvent::Status {
                    task_id,
                    status,
                    end_time,
                } => {
                    if let Some(task) = tasks.get_mut(&task_id) {
                        if !task.is_terminal() {
                            task.status = status;
                            if end_time.is_some() {
                                task.end_time = end_time;
                            }
                        }
                    }
                }
                // Audit trail only; the config file plus live overrides
                // are the configuration source of truth
                WalEvent::ConfigOverride { .. } => {}
            }
        }

        self.queue.clear();

        let mut requeued = 0usize;
        for id in &add_order {
            let Some(task) = tasks.get_mut(id) else {
                continue;
            };
            if task.is_terminal() {
                continue;
            }
            task.status = TaskStatus::Pending;
            task.start_time = None;
            let seq = self.enqueue_seq.fetch_add(1, Ordering::SeqCst);
            task.enqueue_seq = seq;
            requeued += 1;
        }

        // Push after the map is final so queue entries match the store
        let requeue: Vec<(i64, u64, TaskId)> = add_order
            .iter()
            .filter_map(|id| tasks.get(id))
            .filter(|task| !task.is_terminal())
            .map(|task| (task.priority, task.enqueue_seq, task.id.clone()))
            .collect();

        self.store.replace(tasks);
        for (priority, seq, id) in requeue {
            self.queue.push(priority, seq, id);
        }

        if requeued > 0 {
            info!(requeued, "recovered non-terminal tasks from WAL");
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
