use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{SendTimeoutError, Sender};

use super::{CLOSE_POLL_INTERVAL, Item};
use crate::error::StreamError;

/// The producer's half of a [`super::pipe`].
///
/// `Writer` does not implement `Clone`: the streaming substrate is
/// single-producer/single-consumer, and cloning would silently turn a
/// programming error (two producers racing `close`) into undefined
/// ordering.
pub struct Writer<T> {
    tx: Sender<Item<T>>,
    capacity: usize,
    recv_closed: Arc<AtomicBool>,
    send_closed: Arc<AtomicBool>,
}

/// Whether a send reached the receiver or found it already closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Closed,
}

impl<T> Writer<T> {
    pub(super) fn new(
        tx: Sender<Item<T>>,
        capacity: usize,
        recv_closed: Arc<AtomicBool>,
        send_closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            tx,
            capacity,
            recv_closed,
            send_closed,
        }
    }

    /// Pushes a value onto the stream, blocking while the bounded buffer is
    /// full.
    ///
    /// # Panics
    ///
    /// Panics if this writer has already been closed: sending after
    /// `close()` is a programming error, not a recoverable condition (§7).
    pub fn send(&self, value: T) -> SendOutcome {
        self.push(Item::Value(value))
    }

    /// Pushes a fatal error onto the stream. Same close/panic discipline as
    /// [`Writer::send`].
    pub fn send_error(&self, err: StreamError) -> SendOutcome {
        self.push(Item::Err(err))
    }

    fn push(&self, mut item: Item<T>) -> SendOutcome {
        assert!(
            !self.send_closed.load(Ordering::Acquire),
            "send after close on a conflux::stream::Writer"
        );
        if self.recv_closed.load(Ordering::Acquire) {
            return SendOutcome::Closed;
        }
        loop {
            match self.tx.send_timeout(item, CLOSE_POLL_INTERVAL) {
                Ok(()) => return SendOutcome::Sent,
                Err(SendTimeoutError::Disconnected(_)) => return SendOutcome::Closed,
                Err(SendTimeoutError::Timeout(back)) => {
                    if self.recv_closed.load(Ordering::Acquire) {
                        return SendOutcome::Closed;
                    }
                    item = back;
                }
            }
        }
    }

    /// Closes the send side. Idempotent: once closed, the receiver drains
    /// whatever is buffered and then observes terminal.
    pub fn close(&self) {
        self.send_closed.store(true, Ordering::Release);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.send_closed.load(Ordering::Acquire) || self.recv_closed.load(Ordering::Acquire)
    }
}

impl<T> Drop for Writer<T> {
    fn drop(&mut self) {
        self.send_closed.store(true, Ordering::Release);
    }
}
