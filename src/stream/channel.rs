use crate::error::StreamError;

/// A value or a fatal error travelling through the same FIFO slot, so that
/// ordering between the two is preserved relative to each other.
pub(crate) enum Item<T> {
    Value(T),
    Err(StreamError),
}
