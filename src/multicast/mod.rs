//! The multicast engine: lets `n` independent consumers each read the full
//! remaining sequence of a single upstream [`crate::reader::Reader`] exactly
//! once.
//!
//! A single puller thread drains upstream into an append-only, cursor
//! indexed [`log::Log`]; each child reader is just an index into that log
//! plus a reference to the shared [`Engine`]. Closing the last child tears
//! the puller down and closes upstream — but see [`log::Log::recv`] for why
//! that teardown must be safe to observe from a thread other than the one
//! blocked in `recv`.

mod log;

use std::sync::Arc;
use std::thread;

pub(crate) use log::CloseDriver;
use log::{Entry, Log};

use crate::error::StreamError;
use crate::panic;
use crate::reader::{Kind, Reader};
use crate::stream::Recv;

/// Tuning knobs for a multicast tree. Constructed with [`MulticastOptions::new`]
/// and passed to [`Reader::copy_with_options`] ([`Reader::copy`] just uses
/// [`MulticastOptions::default`]) — exposed publicly so callers who want a
/// named puller thread (useful in a `tracing`-instrumented process with many
/// multicast trees) can set one.
#[derive(Debug, Clone)]
pub struct MulticastOptions {
    thread_name: String,
}

impl Default for MulticastOptions {
    fn default() -> Self {
        Self {
            thread_name: "conflux-multicast-puller".to_string(),
        }
    }
}

impl MulticastOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the OS thread name used for this tree's puller, which
    /// otherwise defaults to `"conflux-multicast-puller"`.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

pub(crate) struct Engine<T> {
    log: Arc<Log<T>>,
    upstream: Arc<Reader<T>>,
}

impl<T: Clone + Send + Sync + 'static> Engine<T> {
    pub(crate) fn spawn(upstream: Reader<T>, n: usize) -> Vec<Reader<T>> {
        Self::spawn_with_options(upstream, n, MulticastOptions::default())
    }

    pub(crate) fn spawn_with_options(
        upstream: Reader<T>,
        n: usize,
        options: MulticastOptions,
    ) -> Vec<Reader<T>> {
        if n == 0 {
            return Vec::new();
        }

        let log = Arc::new(Log::new());
        let ids: Vec<u64> = (0..n).map(|_| log.register_child()).collect();
        let upstream = Arc::new(upstream);

        let puller_log = log.clone();
        let puller_upstream = upstream.clone();
        thread::Builder::new()
            .name(options.thread_name)
            .spawn(move || run_puller(puller_upstream, puller_log))
            .expect("spawn conflux multicast puller thread");

        let engine = Arc::new(Engine { log, upstream });
        ids.into_iter()
            .map(|id| {
                Reader::from_kind(Kind::Child {
                    engine: engine.clone(),
                    id,
                })
            })
            .collect()
    }

    pub(crate) fn recv(&self, id: u64) -> Result<Recv<T>, StreamError> {
        match self.log.recv(id) {
            Some(Entry::Value(v)) => Ok(Recv::Item(v)),
            Some(Entry::Err(e)) => Err(e),
            Some(Entry::Eof) | None => Ok(Recv::Eof),
        }
    }

    /// Releases one child's cursor. If that was the last live child, closes
    /// upstream — which, for a `StreamReader`-backed or nested-child-backed
    /// upstream, promptly unblocks the puller thread's current `recv` call.
    pub(crate) fn close_child(&self, id: u64, driver: CloseDriver) {
        let live = self.log.remove_child(id, driver);
        if live == 0 {
            self.upstream.close();
        }
    }

    #[cfg(test)]
    pub(crate) fn manual_closes(&self) -> usize {
        self.log.manual_closes()
    }

    #[cfg(test)]
    pub(crate) fn auto_closes(&self) -> usize {
        self.log.auto_closes()
    }
}

fn run_puller<T: Clone + Send + Sync + 'static>(upstream: Arc<Reader<T>>, log: Arc<Log<T>>) {
    let span = tracing::debug_span!("multicast_puller");
    let _enter = span.enter();
    let result = panic::guard("multicast_puller", || {
        loop {
            if log.live_children() == 0 {
                break;
            }
            match upstream.recv() {
                Ok(Recv::Item(v)) => log.push(Entry::Value(v)),
                Ok(Recv::Eof) => {
                    log.push(Entry::Eof);
                    break;
                }
                Err(e) => {
                    log.push(Entry::Err(e));
                    break;
                }
            }
        }
    });
    if let Err(panic_err) = result {
        tracing::error!(error = %panic_err, "multicast puller panicked");
        log.push(Entry::Err(StreamError::from(panic_err)));
    }
    log.mark_puller_done();
    upstream.close();
}
