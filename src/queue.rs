//! Bounded, thread-safe, blocking FIFO queue with irreversible shutdown.
//!
//! The three pipeline hand-off queues (depth frames, pose-graph updates,
//! integration frames) are instances of [`ThreadsafeQueue`]. The capacity
//! is a backpressure watermark: plain [`push`](ThreadsafeQueue::push) never
//! blocks and never drops, while the integration stage's producer chooses
//! between [`push_blocking_if_full`](ThreadsafeQueue::push_blocking_if_full)
//! (stall, never lose data) and [`push_dropping`](ThreadsafeQueue::push_dropping)
//! (stay real-time, may lose data).
//!
//! [`shutdown`](ThreadsafeQueue::shutdown) wakes every blocked producer and
//! consumer; after it, all operations fail permanently with [`QueueClosed`].

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Returned by every queue operation once the queue has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue has been shut down")]
pub struct QueueClosed;

struct Inner<T> {
    items: VecDeque<T>,
    shutdown: bool,
}

/// Bounded FIFO queue shared between one producer side and one consumer side.
pub struct ThreadsafeQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> ThreadsafeQueue<T> {
    /// Create a queue with the given backpressure watermark.
    /// The watermark must be non-zero; it is validated by the pipeline
    /// configuration before any queue is built.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Append without blocking. Fails only after shutdown.
    pub fn push(&self, value: T) -> Result<(), QueueClosed> {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return Err(QueueClosed);
        }
        inner.items.push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append, waiting while the queue is at or above its watermark.
    pub fn push_blocking_if_full(&self, value: T) -> Result<(), QueueClosed> {
        let mut inner = self.inner.lock();
        while !inner.shutdown && inner.items.len() >= self.capacity {
            self.not_full.wait(&mut inner);
        }
        if inner.shutdown {
            return Err(QueueClosed);
        }
        inner.items.push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append unless the queue is at its watermark. Returns whether the
    /// value was enqueued; a `false` means the caller chose to drop it.
    pub fn push_dropping(&self, value: T) -> Result<bool, QueueClosed> {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return Err(QueueClosed);
        }
        if inner.items.len() >= self.capacity {
            return Ok(false);
        }
        inner.items.push_back(value);
        self.not_empty.notify_one();
        Ok(true)
    }

    /// Wait for the next element. Wakes on push and on shutdown; once
    /// shutdown is flagged this fails regardless of remaining content.
    pub fn pop_blocking(&self) -> Result<T, QueueClosed> {
        let mut inner = self.inner.lock();
        while !inner.shutdown && inner.items.is_empty() {
            self.not_empty.wait(&mut inner);
        }
        if inner.shutdown {
            return Err(QueueClosed);
        }
        let value = inner.items.pop_front().expect("queue non-empty");
        self.not_full.notify_one();
        Ok(value)
    }

    /// Take the next element if one is ready, without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return None;
        }
        let value = inner.items.pop_front();
        if value.is_some() {
            self.not_full.notify_one();
        }
        value
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Irreversibly close the queue and wake every blocked caller.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        inner.items.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}
