use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{RecvTimeoutError, Receiver};

use super::{CLOSE_POLL_INTERVAL, Item, Recv};
use crate::error::StreamError;

/// The consumer's half of a [`super::pipe`]. Raw, point-to-point: this is
/// the building block the [`crate::reader::Reader`] facade wraps as its
/// stream-backed variant.
pub struct StreamReader<T> {
    rx: Receiver<Item<T>>,
    capacity: usize,
    recv_closed: Arc<AtomicBool>,
    send_closed: Arc<AtomicBool>,
}

impl<T> StreamReader<T> {
    pub(super) fn new(
        rx: Receiver<Item<T>>,
        capacity: usize,
        recv_closed: Arc<AtomicBool>,
        send_closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            rx,
            capacity,
            recv_closed,
            send_closed,
        }
    }

    /// Blocks until an item is ready or the stream is drained and
    /// send-closed, in which case it returns [`Recv::Eof`]. Idempotent once
    /// terminal: the underlying channel only reports `Disconnected` once
    /// empty, and the `send_closed` flag check covers the case where the
    /// writer closed without dropping its handle.
    pub fn recv(&self) -> Result<Recv<T>, StreamError> {
        if self.recv_closed.load(Ordering::Acquire) {
            return Ok(Recv::Eof);
        }
        loop {
            match self.rx.recv_timeout(CLOSE_POLL_INTERVAL) {
                Ok(Item::Value(v)) => return Ok(Recv::Item(v)),
                Ok(Item::Err(e)) => return Err(e),
                Err(RecvTimeoutError::Disconnected) => return Ok(Recv::Eof),
                Err(RecvTimeoutError::Timeout) => {
                    if self.recv_closed.load(Ordering::Acquire)
                        || self.send_closed.load(Ordering::Acquire)
                    {
                        // Buffer is empty (recv_timeout would have returned
                        // an item otherwise) and the writer is gone: drain
                        // one more time to be safe against a last-moment
                        // send racing the flag, then terminate.
                        match self.rx.try_recv() {
                            Ok(Item::Value(v)) => return Ok(Recv::Item(v)),
                            Ok(Item::Err(e)) => return Err(e),
                            Err(_) => return Ok(Recv::Eof),
                        }
                    }
                }
            }
        }
    }

    /// Closes the receive side. Idempotent; the writer's next `send`
    /// observes [`super::SendOutcome::Closed`].
    pub fn close(&self) {
        self.recv_closed.store(true, Ordering::Release);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.send_closed.load(Ordering::Acquire) || self.recv_closed.load(Ordering::Acquire)
    }
}

impl<T> Drop for StreamReader<T> {
    fn drop(&mut self) {
        self.recv_closed.store(true, Ordering::Release);
    }
}
