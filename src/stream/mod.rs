//! Bounded, point-to-point stream: the backbone of every transport in this
//! crate.
//!
//! ## How It Works
//!
//!```text
//!        Writer::send                      StreamReader::recv
//!             │                                    │
//!             ▼                                    ▼
//!     ┌───────────────────────────────────────────────────┐
//!     │   crossbeam_channel::bounded(capacity)             │  (T or err)
//!     └───────────────────────────────────────────────────┘
//!             ▲                                    ▲
//!        send_closed                          recv_closed
//!        (Writer::close)                   (StreamReader::close)
//!```
//!
//! - A value and a fatal error travel on the **same** FIFO, as [`Item`], so
//!   ordering between values and errors is preserved.
//! - `send_closed` / `recv_closed` are independent, idempotent flags rather
//!   than relying on dropping the underlying channel handle: this lets
//!   either side close without racing the other side's in-flight blocking
//!   call. Both [`Writer::send`] and [`StreamReader::recv`] poll the
//!   underlying channel with a short timeout and re-check the relevant flag
//!   between polls, so a `close()` issued from another thread is observed
//!   within one poll interval rather than only at the next channel activity.
//!
//! ## Example
//!
//!```
//! use conflux::stream::{pipe, Recv};
//!
//! let (tx, rx) = pipe::<i32>(4);
//! tx.send(1);
//! tx.send(2);
//! tx.close();
//!
//! assert!(matches!(rx.recv().unwrap(), Recv::Item(1)));
//! assert!(matches!(rx.recv().unwrap(), Recv::Item(2)));
//! assert!(matches!(rx.recv().unwrap(), Recv::Eof));
//! ```

mod channel;
mod reader;
mod writer;

pub use reader::StreamReader;
pub use writer::{SendOutcome, Writer};

use crate::error::StreamError;

/// Poll granularity used by [`Writer::send`]/[`StreamReader::recv`] to
/// re-check the cooperative close flags while blocked on the underlying
/// channel. Small enough that `close()` is observed promptly, large enough
/// that a busy stream never spins.
pub(crate) const CLOSE_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(10);

/// The outcome of a single [`StreamReader::recv`]: either the next item, or
/// the idempotent end-of-stream terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recv<T> {
    Item(T),
    Eof,
}

impl<T> Recv<T> {
    pub fn item(self) -> Option<T> {
        match self {
            Recv::Item(v) => Some(v),
            Recv::Eof => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Recv::Eof)
    }
}

/// Creates a bounded stream of the given capacity (`0` is a valid, rendezvous
/// capacity: `crossbeam_channel::bounded(0)` makes `send` and `recv` hand off
/// synchronously).
pub fn pipe<T: Send + 'static>(capacity: usize) -> (Writer<T>, StreamReader<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let recv_closed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let send_closed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    (
        Writer::new(tx, capacity, recv_closed.clone(), send_closed.clone()),
        StreamReader::new(rx, capacity, recv_closed, send_closed),
    )
}

pub(crate) use channel::Item;
