use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use super::{Kind, Reader};
use crate::error::{SourceEof, StreamError};
use crate::panic;
use crate::queue::UnboundedQueue;
use crate::stream::Recv;

enum MergeItem<T> {
    Value(T),
    Err(StreamError),
}

/// Fan-in of heterogeneous sub-readers. One background forwarder thread per
/// source drains that source into a shared [`UnboundedQueue`]; the merged
/// reader itself is just a consumer of that queue. This is the generic
/// implementation the distilled spec's §4.3 performance note asks to
/// fast-path for small fan-ins (1–5 sources) via an unrolled channel select,
/// falling back to dynamic selection above that — see DESIGN.md for why this
/// crate uses one uniform strategy instead: `Reader<T>`'s whole point is to
/// hide whether a source is a raw channel, an array, another merge, or a
/// multicast child, and only the first of those can be selected over with
/// `crossbeam_channel::Select` in the first place.
pub(crate) struct MultiReader<T> {
    queue: Arc<UnboundedQueue<MergeItem<T>>>,
}

impl<T: Send + Sync + 'static> MultiReader<T> {
    pub(crate) fn recv(&self) -> Result<Recv<T>, StreamError> {
        match self.queue.pop() {
            Some(MergeItem::Value(v)) => Ok(Recv::Item(v)),
            Some(MergeItem::Err(e)) => Err(e),
            None => Ok(Recv::Eof),
        }
    }
}

/// Unordered fan-in: terminates once every source has terminated. The
/// multiset of items emitted equals the multiset union of the sources'
/// items; no ordering is guaranteed across sources, only within each one.
pub fn merge<T: Send + Sync + 'static>(readers: Vec<Reader<T>>) -> Reader<T> {
    build(readers.into_iter().map(|r| (None, r)).collect())
}

/// Like [`merge`], but each source is named, and its termination is
/// observed by the consumer as exactly one [`StreamError::SourceEof`] item
/// (detectable via [`StreamError::source_eof_name`]) before that source's
/// slot is freed. The merged reader's own terminal fires only once every
/// source has both ended and emitted its `SourceEof`.
pub fn merge_named<T: Send + Sync + 'static>(readers: HashMap<String, Reader<T>>) -> Reader<T> {
    build(readers.into_iter().map(|(name, r)| (Some(name), r)).collect())
}

fn build<T: Send + Sync + 'static>(sources: Vec<(Option<String>, Reader<T>)>) -> Reader<T> {
    let queue = Arc::new(UnboundedQueue::new());
    if sources.is_empty() {
        queue.close();
        return Reader::from_kind(Kind::Multi(MultiReader { queue }));
    }

    let live = Arc::new(AtomicUsize::new(sources.len()));
    for (name, reader) in sources {
        let queue = queue.clone();
        let live = live.clone();
        thread::Builder::new()
            .name("conflux-merge-forwarder".into())
            .spawn(move || forward(name, reader, &queue, &live))
            .expect("spawn conflux merge forwarder thread");
    }

    Reader::from_kind(Kind::Multi(MultiReader { queue }))
}

fn forward<T: Send + Sync + 'static>(
    name: Option<String>,
    reader: Reader<T>,
    queue: &UnboundedQueue<MergeItem<T>>,
    live: &AtomicUsize,
) {
    let span = tracing::debug_span!("merge_forwarder", source = name.as_deref().unwrap_or("_"));
    let _enter = span.enter();
    let result = panic::guard("merge_forwarder", || loop {
        match reader.recv() {
            Ok(Recv::Item(v)) => queue.push(MergeItem::Value(v)),
            Ok(Recv::Eof) => break,
            Err(e) => {
                queue.push(MergeItem::Err(e));
                break;
            }
        }
    });
    if let Err(panic_err) = result {
        tracing::error!(error = %panic_err, "merge forwarder panicked");
        queue.push(MergeItem::Err(StreamError::from(panic_err)));
    }
    if let Some(name) = name {
        queue.push(MergeItem::Err(StreamError::from(SourceEof::new(name))));
    }
    if live.fetch_sub(1, Ordering::AcqRel) == 1 {
        queue.close();
    }
}
