//! An unbounded, mutex+condvar-backed FIFO for producers that must never
//! block.
//!
//! Used to back the [`crate::multicast`] engine's append-only log and the
//! [`crate::reader::merge`]/[`crate::reader::merge_named`] fan-in path:
//! both have many producers (a puller thread, or one forwarder thread per
//! merged source) that must keep draining their own upstream regardless of
//! whether the single consumer has caught up.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct UnboundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> Default for UnboundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UnboundedQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Appends a value. Never blocks.
    ///
    /// # Panics
    ///
    /// Panics if the queue has been [`close`](Self::close)d: a producer
    /// pushing into a closed queue is a programming error, not a
    /// recoverable condition.
    pub fn push(&self, value: T) {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.closed, "push on a closed conflux::queue::UnboundedQueue");
        inner.items.push_back(value);
        drop(inner);
        self.not_empty.notify_one();
    }

    /// Waits while empty and not closed; returns `None` once closed and
    /// drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Idempotent; wakes every waiter so a blocked `pop` observes the close.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
