// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dynamic worker pool and autoscaler.

use std::cmp;
use std::sync::Arc;

use parking_lot::Mutex;
use stoker_core::Clock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::worker::{self, WorkerCtx};

struct WorkerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Set of worker tasks, resized by the autoscaler.
pub(crate) struct WorkerPool<C: Clock> {
    ctx: Arc<WorkerCtx<C>>,
    workers: Mutex<Vec<WorkerHandle>>,
    /// Cancelled workers still finishing their current task; awaited on
    /// shutdown
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Clock + 'static> WorkerPool<C> {
    pub fn new(ctx: Arc<WorkerCtx<C>>) -> Self {
        Self {
            ctx,
            workers: Mutex::new(Vec::new()),
            retired: Mutex::new(Vec::new()),
        }
    }

    pub fn ctx(&self) -> &Arc<WorkerCtx<C>> {
        &self.ctx
    }

    /// Current number of live (non-exited) workers.
    pub fn worker_count(&self) -> usize {
        let mut workers = self.workers.lock();
        workers.retain(|w| !w.handle.is_finished());
        workers.len()
    }

    /// Grow or shrink toward `desired` workers.
    ///
    /// Shrinking cancels tokens; each cancelled worker finishes its
    /// current task (if any) and then exits.
    pub fn scale_to(&self, desired: usize) {
        let mut workers = self.workers.lock();
        workers.retain(|w| !w.handle.is_finished());

        while workers.len() < desired {
            let token = self.ctx.shutdown.child_token();
            let handle = tokio::spawn(worker::run(Arc::clone(&self.ctx), token.clone()));
            workers.push(WorkerHandle { token, handle });
        }

        while workers.len() > desired {
            if let Some(worker) = workers.pop() {
                worker.token.cancel();
                self.retired.lock().push(worker.handle);
            }
        }
    }

    /// Cancel everything and wait for all workers to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock();
            workers
                .drain(..)
                .map(|w| {
                    w.token.cancel();
                    w.handle
                })
                .collect()
        };
        let retired: Vec<JoinHandle<()>> = self.retired.lock().drain(..).collect();

        for handle in handles.into_iter().chain(retired) {
            let _ = handle.await;
        }
    }
}

/// Periodically resize the pool toward
/// `min(max_concurrency, max(1, queue_depth))`.
pub(crate) async fn run_autoscaler<C: Clock + 'static>(
    pool: Arc<WorkerPool<C>>,
    shutdown: CancellationToken,
) {
    loop {
        let period = pool.ctx().config.snapshot().autoscale_period();
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }

        // Re-read after the sleep so runtime overrides apply promptly
        let config = pool.ctx().config.snapshot();
        let desired = cmp::min(
            cmp::max(1, config.max_concurrency),
            cmp::max(1, pool.ctx().queue.len()),
        );
        let current = pool.worker_count();
        if desired != current {
            debug!(current, desired, "autoscaling worker pool");
        }
        pool.scale_to(desired);
    }
}
