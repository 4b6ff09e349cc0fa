use std::marker::PhantomData;
use std::sync::Mutex;

use super::{Kind, Reader};
use crate::error::StreamError;
use crate::stream::Recv;

/// What a [`super::convert`] function returns for one input item.
pub enum ConvertOutcome<U> {
    /// Passes `u` through to the downstream reader.
    Value(U),
    /// Drops the item silently — filter semantics. Distinct from
    /// [`ConvertOutcome::Error`], which is a fatal, propagated failure.
    Skip,
    /// Propagates a fatal error to the downstream reader.
    Error(StreamError),
}

/// Type-erased so [`Kind::Convert`] can hold a converted reader regardless of
/// its upstream type `T`, which only appears in this trait's implementor.
pub(crate) trait ConvertSource<U>: Send + Sync {
    fn recv(&self) -> Result<Recv<U>, StreamError>;
    fn close(&self);
}

struct ConvertState<T, U, F> {
    inner: Reader<T>,
    f: Mutex<F>,
    _marker: PhantomData<fn() -> U>,
}

impl<T, U, F> ConvertSource<U> for ConvertState<T, U, F>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: FnMut(T) -> ConvertOutcome<U> + Send,
{
    fn recv(&self) -> Result<Recv<U>, StreamError> {
        loop {
            match self.inner.recv()? {
                Recv::Eof => return Ok(Recv::Eof),
                Recv::Item(v) => {
                    // The converter is required to be pure and cheap: it
                    // runs synchronously, inline, on the consumer's own
                    // thread — no background thread is spawned for this
                    // reader kind.
                    let mut f = self.f.lock().unwrap();
                    match f(v) {
                        ConvertOutcome::Value(u) => return Ok(Recv::Item(u)),
                        ConvertOutcome::Skip => continue,
                        ConvertOutcome::Error(e) => return Err(e),
                    }
                }
            }
        }
    }

    fn close(&self) {
        self.inner.close();
    }
}

pub(crate) fn new<T, U, F>(reader: Reader<T>, f: F) -> Reader<U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: FnMut(T) -> ConvertOutcome<U> + Send + 'static,
{
    let state = ConvertState {
        inner: reader,
        f: Mutex::new(f),
        _marker: PhantomData,
    };
    Reader::from_kind(Kind::Convert(Box::new(state)))
}
