use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::stream::Recv;

/// An immutable, in-memory sequence read by cursor. `copy` is cheap: every
/// copy shares the same backing `Arc<[T]>` and just gets its own cursor
/// starting from the point it was forked, unlike every other reader kind
/// which must be promoted into a full [`crate::multicast::Engine`].
pub(crate) struct ArrayReader<T> {
    items: Arc<[T]>,
    cursor: AtomicUsize,
}

impl<T: Clone> ArrayReader<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub(crate) fn recv(&self) -> Recv<T> {
        let i = self.cursor.fetch_add(1, Ordering::AcqRel);
        match self.items.get(i) {
            Some(v) => Recv::Item(v.clone()),
            None => {
                // Undo the speculative advance so a reader that keeps
                // calling `recv` past the end doesn't overflow the cursor.
                self.cursor.fetch_sub(1, Ordering::AcqRel);
                Recv::Eof
            }
        }
    }

    pub(crate) fn copy(&self, n: usize) -> Vec<ArrayReader<T>> {
        let from = self.cursor.load(Ordering::Acquire);
        (0..n)
            .map(|_| ArrayReader {
                items: self.items.clone(),
                cursor: AtomicUsize::new(from),
            })
            .collect()
    }
}
