//! Error types shared by every component of the streaming substrate.
//!
//! The crate deliberately funnels every fallible stream operation through a
//! single [`StreamError`] rather than threading a generic error parameter
//! through `Stream`, `Reader`, `Multicast`, and `Concat` — mirroring the way
//! the framework this crate was extracted from treats "error" as one
//! universal interface rather than a per-component associated type.

use std::fmt;
use std::sync::Arc;

/// A boxed, thread-safe error, used wherever a caller-supplied error needs to
/// travel through the crate without the crate knowing its concrete type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Per-source end-of-stream signal emitted by [`crate::reader::merge_named`].
///
/// Distinct from the merged reader's own terminal: a `SourceEof` means *one*
/// of the merged sources ended, not that the merge itself is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEof {
    name: String,
}

impl SourceEof {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SourceEof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source \"{}\" reached end of stream", self.name)
    }
}

/// Captures a panic that unwound inside a thread this crate spawned
/// internally (a multicast puller, a merge forwarder), so it can be
/// republished to the consumer instead of silently killing the thread.
///
/// The stack is recorded as an opaque, already-formatted string: this crate
/// has no opinion on symbolication, it just refuses to let a panic vanish
/// without a trace reaching the consumer.
#[derive(Debug, Clone)]
pub struct PanicError {
    message: String,
    stack: Arc<str>,
}

impl PanicError {
    pub fn new(message: impl Into<String>, stack: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
            stack: stack.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic in background task: {}", self.message)
    }
}

/// The single error type every [`crate::reader::Reader::recv`] can yield.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// One source of a [`crate::reader::merge_named`] ended. Non-fatal: the
    /// merged reader keeps producing from the remaining sources.
    #[error("{0}")]
    SourceEof(SourceEof),
    /// A thread this crate spawned internally panicked; the panic has been
    /// converted into this value rather than unwinding into the consumer.
    #[error("{0}")]
    Panic(PanicError),
    /// Any other fatal, producer-supplied error.
    #[error("{0}")]
    Message(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl StreamError {
    pub fn message(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Message(Arc::new(err))
    }

    pub fn from_box(err: BoxError) -> Self {
        Self::Message(Arc::from(err))
    }

    /// Returns the source name if this is a [`SourceEof`] signal, `None`
    /// otherwise. This is the crate's public predicate for distinguishing
    /// "one merged source ended" from every other kind of error.
    pub fn source_eof_name(&self) -> Option<&str> {
        match self {
            StreamError::SourceEof(eof) => Some(eof.name()),
            _ => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, StreamError::Panic(_))
    }
}

impl From<SourceEof> for StreamError {
    fn from(eof: SourceEof) -> Self {
        StreamError::SourceEof(eof)
    }
}

impl From<PanicError> for StreamError {
    fn from(err: PanicError) -> Self {
        StreamError::Panic(err)
    }
}
