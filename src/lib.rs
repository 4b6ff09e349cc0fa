//! conflux: the streaming dataflow substrate underneath an LLM-agent
//! orchestration framework.
//!
//! Four pieces compose into everything above this crate:
//!
//! - [`stream`] — a bounded, point-to-point FIFO with cooperative close on
//!   either end ([`stream::pipe`]).
//! - [`reader`] — the [`reader::Reader`] facade every consumer actually
//!   holds, plus the ways to build one: [`reader::from_array`],
//!   [`reader::convert`], [`reader::merge`]/[`reader::merge_named`], and
//!   [`reader::Reader::copy`] for fan-out.
//! - [`multicast`] — the engine backing `copy`: one puller thread, `n`
//!   independent children, each reading the same upstream sequence exactly
//!   once.
//! - [`concat`] — reduces a finite, ordered sequence of fragments (most
//!   often streamed [`message::Message`] deltas) into one aggregate value,
//!   via a process-wide registry of reducers.
//!
//! None of this crate's public API is `async`: every blocking call parks its
//! calling thread, and fan-out/fan-in is implemented with a small number of
//! named background threads rather than a runtime.

pub mod concat;
pub mod error;
pub mod message;
pub mod multicast;
pub mod reader;
pub mod stream;

pub(crate) mod panic;
pub(crate) mod queue;

pub use error::{BoxError, PanicError, SourceEof, StreamError};
pub use message::Message;
pub use reader::{Reader, convert, from_array, merge, merge_named};
pub use stream::{Recv, pipe};

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// This crate's API is synchronous and thread-based, but most of the
    /// framework it backs runs inside a `tokio` runtime — so a producer or
    /// consumer almost always lives on a `spawn_blocking` task rather than a
    /// bare `std::thread`. Confirms nothing about `pipe`/`copy` depends on
    /// being driven from a plain OS thread.
    #[tokio::test]
    async fn pipe_driven_from_tokio_spawn_blocking() {
        let (tx, rx) = pipe::<u32>(4);
        let producer = tokio::task::spawn_blocking(move || {
            for i in 0..50 {
                tx.send(i);
            }
            tx.close();
        });
        let consumer = tokio::task::spawn_blocking(move || {
            let mut got = Vec::new();
            loop {
                match rx.recv().unwrap() {
                    Recv::Item(v) => got.push(v),
                    Recv::Eof => break,
                }
            }
            got
        });

        producer.await.unwrap();
        let got = consumer.await.unwrap();
        assert_eq!(got, (0..50).collect::<Vec<_>>());
    }

    /// Smoke-checks that the puller/forwarder threads' `tracing` spans
    /// (§2.1) don't panic or deadlock when a real subscriber is installed,
    /// rather than relying on `tracing`'s no-op default dispatcher.
    #[test]
    fn multicast_puller_runs_under_a_real_subscriber() {
        let _guard = tracing_subscriber::fmt()
            .with_test_writer()
            .try_init();

        let reader = from_array(vec![1, 2, 3]);
        for child in reader.copy(num_cpus::get().clamp(2, 8)) {
            let mut got = Vec::new();
            loop {
                match child.recv().unwrap() {
                    Recv::Item(v) => got.push(v),
                    Recv::Eof => break,
                }
            }
            assert_eq!(got, vec![1, 2, 3]);
        }
    }
}
