//! The reader facade: a tagged union over every source of a typed stream.
//!
//! Every consumer in this crate (and in the agents, tools, and graph nodes
//! built on top of it) talks to a [`Reader<T>`] and never to the concrete
//! source behind it. That uniformity is what lets [`Reader::copy`] turn an
//! arbitrary reader into a multicast tree, and what lets [`merge`] fan in
//! sources that are backed by entirely different mechanisms (a bounded
//! stream, a static array, another merge, a multicast child, a converted
//! reader) without the consumer ever noticing.

mod array;
mod convert;
mod multi;

pub use convert::ConvertOutcome;
pub use multi::{merge, merge_named};

pub use crate::error::SourceEof;
pub use crate::stream::Recv;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StreamError;
use crate::multicast::{self, CloseDriver};

pub(crate) enum Kind<T> {
    Stream(crate::stream::StreamReader<T>),
    Array(array::ArrayReader<T>),
    Multi(multi::MultiReader<T>),
    Child {
        engine: std::sync::Arc<multicast::Engine<T>>,
        id: u64,
    },
    Convert(Box<dyn convert::ConvertSource<T> + Send + Sync>),
    /// Placeholder left behind by [`Reader::into_kind`] once its contents
    /// have been moved into a new reader (e.g. by [`Reader::copy`]). Never
    /// observed outside this module.
    Taken,
}

/// A uniform handle over any stream source.
///
/// `Reader<T>` is the only type consumers hold: it does not matter whether
/// the underlying sequence comes from a [`crate::stream::pipe`], a static
/// slice ([`from_array`]), a fan-in of other readers ([`merge`]), a child of
/// a [`Reader::copy`] multicast tree, or a lazily-applied [`convert`] — the
/// `recv`/`close`/`copy`/`set_automatic_close` contract is the same.
pub struct Reader<T> {
    pub(crate) kind: Kind<T>,
    closed: AtomicBool,
    automatic_close: AtomicBool,
}

impl<T: Send + Sync + 'static> Reader<T> {
    pub(crate) fn from_kind(kind: Kind<T>) -> Self {
        Self {
            kind,
            closed: AtomicBool::new(false),
            automatic_close: AtomicBool::new(false),
        }
    }

    /// Blocks until the next value, the idempotent end-of-stream terminator,
    /// a fatal error, or (merged readers only) a [`SourceEof`] signal.
    ///
    /// Once this returns [`Recv::Eof`] or a fatal [`StreamError`] other than
    /// `SourceEof`, every subsequent call returns the same terminal outcome.
    pub fn recv(&self) -> Result<Recv<T>, StreamError> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(Recv::Eof);
        }
        match &self.kind {
            Kind::Stream(s) => s.recv(),
            Kind::Array(a) => Ok(a.recv()),
            Kind::Multi(m) => m.recv(),
            Kind::Child { engine, id } => engine.recv(*id),
            Kind::Convert(c) => c.recv(),
            Kind::Taken => Ok(Recv::Eof),
        }
    }

    /// Idempotent. Releases whatever this reader variant owns: closes the
    /// inner [`crate::stream::StreamReader`] for a stream-backed reader,
    /// decrements the parent engine's live-child count for a multicast
    /// child, closes the wrapped reader for a converted reader. A merge's
    /// `close` is local only — per the propagation policy in §7, it does not
    /// reach into the merge's own sub-readers, which keep draining on their
    /// own background threads until their sources end naturally.
    pub fn close(&self) {
        self.close_with(CloseDriver::User);
    }

    fn close_with(&self, driver: CloseDriver) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.kind {
            Kind::Stream(s) => s.close(),
            Kind::Array(_) => {}
            Kind::Multi(_) => {}
            Kind::Child { engine, id } => engine.close_child(*id, driver),
            Kind::Convert(c) => c.close(),
            Kind::Taken => {}
        }
    }

    /// Opts this reader into finaliser-driven close: if the consumer drops
    /// it without calling [`Reader::close`] explicitly, `Drop` will still
    /// close it. `Drop` always performs that close regardless of this flag
    /// (Rust's deterministic destructors already subsume the leak defence a
    /// GC finalizer provides); the flag only changes which counter the
    /// engine attributes the eventual close to, which is what tests use to
    /// distinguish "the consumer closed this" from "nobody did, and the
    /// safety net fired." Production code should not rely on this — call
    /// `close` explicitly.
    pub fn set_automatic_close(&self) {
        self.automatic_close.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Extracts this reader's [`Kind`], marking the reader itself as closed
    /// so `Drop` treats it as already finalised. Used by [`Reader::copy`] to
    /// consume `self` and repurpose its guts into a new reader without
    /// running this reader's own close logic twice.
    fn into_kind(mut self) -> Kind<T> {
        self.closed.store(true, Ordering::Release);
        std::mem::replace(&mut self.kind, Kind::Taken)
    }

    /// Forks this reader into `n` independent readers, each of which
    /// observes the full remaining sequence in the same order. Consumes
    /// `self`: the type system enforces "the original reader must not be
    /// used directly after `copy`" at compile time rather than as a runtime
    /// discipline.
    ///
    /// An array-backed reader's copy is free — it just shares the backing
    /// slice with a fresh cursor per copy. Every other kind is promoted into
    /// a [`crate::multicast::Engine`]: a single puller thread drains the
    /// original source into a shared, append-only log that each of the `n`
    /// children reads independently.
    ///
    /// Equivalent to [`Reader::copy_with_options`] with
    /// [`multicast::MulticastOptions::default`].
    pub fn copy(self, n: usize) -> Vec<Reader<T>>
    where
        T: Clone,
    {
        self.copy_with_options(n, multicast::MulticastOptions::default())
    }

    /// Like [`Reader::copy`], but lets the caller tune the multicast tree's
    /// puller thread — currently just its name, via
    /// [`multicast::MulticastOptions::with_thread_name`]. Ignored for an
    /// array-backed reader, which never spawns a puller thread in the first
    /// place.
    pub fn copy_with_options(self, n: usize, options: multicast::MulticastOptions) -> Vec<Reader<T>>
    where
        T: Clone,
    {
        match self.into_kind() {
            Kind::Array(a) => a
                .copy(n)
                .into_iter()
                .map(|ar| Reader::from_kind(Kind::Array(ar)))
                .collect(),
            Kind::Taken => unreachable!("into_kind always yields a non-Taken variant here"),
            other => multicast::Engine::spawn_with_options(Reader::from_kind(other), n, options),
        }
    }
}

impl<T: Send + Sync + 'static> Drop for Reader<T> {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.automatic_close.load(Ordering::Acquire) {
            tracing::trace!("automatic close fired for a conflux::reader::Reader");
        } else {
            tracing::debug!(
                "conflux::reader::Reader dropped without an explicit close (no automatic_close \
                 opt-in) — relying on this is a last-resort safety net, not a contract"
            );
        }
        match &self.kind {
            Kind::Stream(s) => s.close(),
            Kind::Array(_) => {}
            Kind::Multi(_) => {}
            Kind::Child { engine, id } => engine.close_child(*id, CloseDriver::Auto),
            Kind::Convert(c) => c.close(),
            Kind::Taken => {}
        }
    }
}

/// A read-only reader over an immutable, in-memory sequence. Never errors;
/// yields every element in order, then terminates.
pub fn from_array<T: Send + Sync + Clone + 'static>(items: Vec<T>) -> Reader<T> {
    Reader::from_kind(Kind::Array(array::ArrayReader::new(items)))
}

/// Applies a pure, lazily-invoked conversion to every item of `reader`.
/// Returning [`ConvertOutcome::Skip`] drops the item (filter semantics);
/// [`ConvertOutcome::Error`] propagates a fatal error; [`ConvertOutcome::Value`]
/// passes the converted item through.
pub fn convert<T, U, F>(reader: Reader<T>, f: F) -> Reader<U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: FnMut(T) -> ConvertOutcome<U> + Send + 'static,
{
    convert::new(reader, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::pipe;

    #[test]
    fn array_reader_yields_in_order_then_terminates() {
        let r = from_array(vec![1, 2, 3]);
        assert_eq!(r.recv().unwrap().item(), Some(1));
        assert_eq!(r.recv().unwrap().item(), Some(2));
        assert_eq!(r.recv().unwrap().item(), Some(3));
        assert!(r.recv().unwrap().is_eof());
        assert!(r.recv().unwrap().is_eof());
    }

    #[test]
    fn array_reader_copy_is_independent() {
        let r = from_array(vec!['a', 'b']);
        let copies = r.copy(3);
        assert_eq!(copies.len(), 3);
        for c in &copies {
            assert_eq!(c.recv().unwrap().item(), Some('a'));
        }
        // advancing one copy doesn't affect the others
        assert_eq!(copies[0].recv().unwrap().item(), Some('b'));
        assert_eq!(copies[1].recv().unwrap().item(), Some('b'));
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let (tx, rx) = pipe::<i32>(1);
        let r = Reader::from_kind(Kind::Stream(rx));
        tx.send(1);
        r.close();
        r.close();
        assert!(r.recv().unwrap().is_eof());
        assert!(r.recv().unwrap().is_eof());
    }

    #[test]
    fn multicast_fidelity_small() {
        let (tx, rx) = pipe::<i32>(0);
        let reader = Reader::from_kind(Kind::Stream(rx));
        let children = reader.copy(4);
        let handle = std::thread::spawn(move || {
            for i in 0..20 {
                tx.send(i);
            }
            tx.close();
        });
        for child in children {
            let mut got = Vec::new();
            loop {
                match child.recv().unwrap() {
                    Recv::Item(v) => got.push(v),
                    Recv::Eof => break,
                }
            }
            assert_eq!(got, (0..20).collect::<Vec<_>>());
        }
        handle.join().unwrap();
    }
}
