// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority queue of task ids.
//!
//! Min-heap ordered by `(priority, enqueue_seq)`: lower priority values
//! dispatch first, and within one priority level tasks dispatch in
//! submission order. Dequeue blocks with a bounded wait; the queue also
//! tracks an unfinished count (items pushed but not yet fully
//! processed) so `join` can wait for drain.

use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;
use stoker_core::TaskId;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
struct QueuedTask {
    priority: i64,
    seq: u64,
    id: TaskId,
}

// Ordering ignores the id: (priority, seq) is unique per entry.
impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        (self.priority, self.seq) == (other.priority, other.seq)
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<QueuedTask>>,
    unfinished: usize,
}

/// Concurrent priority queue with bounded-wait dequeue.
#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    join_notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task id. Non-blocking.
    pub fn push(&self, priority: i64, seq: u64, id: TaskId) {
        {
            let mut inner = self.inner.lock();
            inner.heap.push(Reverse(QueuedTask { priority, seq, id }));
            inner.unfinished += 1;
        }
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<TaskId> {
        self.inner.lock().heap.pop().map(|Reverse(entry)| entry.id)
    }

    /// Dequeue the lowest-(priority, seq) task id, waiting up to
    /// `timeout` for one to arrive.
    pub async fn dequeue(&self, timeout: Duration) -> Option<TaskId> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(id) = self.try_pop() {
                return Some(id);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return None,
            }
        }
    }

    /// Mark one previously dequeued item as fully processed.
    pub fn task_done(&self) {
        let drained = {
            let mut inner = self.inner.lock();
            inner.unfinished = inner.unfinished.saturating_sub(1);
            inner.unfinished == 0
        };
        if drained {
            self.join_notify.notify_waiters();
        }
    }

    /// Wait until every pushed item has been fully processed.
    pub async fn join(&self) {
        loop {
            let notified = self.join_notify.notified();
            tokio::pin!(notified);
            // Register before checking so a task_done between the check
            // and the await is not lost
            notified.as_mut().enable();
            if self.inner.lock().unfinished == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of task ids currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all queued items and reset the unfinished count.
    pub fn clear(&self) {
        {
            let mut inner = self.inner.lock();
            inner.heap.clear();
            inner.unfinished = 0;
        }
        self.join_notify.notify_waiters();
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
