//! The concat engine: reduces a finite, ordered sequence of fragments into a
//! single aggregate value, via a process-wide, type-indexed registry of
//! reducers.
//!
//! Registration is write-once, at start-up: the registry tracks whether it
//! has been read yet and panics on a late [`register`] call, matching §5's
//! "registrations happening concurrently with reductions are undefined" by
//! making the common misuse (registering after the program is already
//! running) loud instead of silently racy.

mod message;

pub use message::{concat_message_stream, concat_messages, split};

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, OnceLock};

use crate::error::StreamError;

/// Every fallible concat operation funnels through this.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConcatError {
    /// Two fragments disagreed on a field that is supposed to be set
    /// identically (or left empty) everywhere it appears — role, tool-call
    /// id, tool name, a tool-call's function name, and so on.
    #[error("conflicting values for {field}: {left:?} vs {right:?}")]
    Conflict {
        field: &'static str,
        left: String,
        right: String,
    },
    /// A `None`/nil fragment was found at this index in the input slice.
    #[error("fragment at index {0} is nil")]
    NilFragment(usize),
    /// No reducer is registered for this type and more than one element in
    /// the slice was non-default: §4.5's "non-trivial reduction must be
    /// registered" safety rule refusing a silent last-wins.
    #[error("no reducer registered for this type, and more than one non-default value was supplied")]
    Unregistered,
    /// A registered reducer itself failed.
    #[error(transparent)]
    Reducer(#[from] Box<dyn std::error::Error + Send + Sync>),
    /// Raised by [`concat_message_stream`] when draining the reader fails.
    #[error(transparent)]
    Stream(StreamError),
}

type Reducer<T> = Box<dyn Fn(&[T]) -> Result<T, ConcatError> + Send + Sync>;

struct Registry {
    reducers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    used: bool,
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| {
        let mut registry = Registry {
            reducers: HashMap::new(),
            used: false,
        };
        register_builtin_string(&mut registry);
        register_builtin_take_last(&mut registry);
        message::register_builtin(&mut registry);
        Mutex::new(registry)
    })
}

fn insert_reducer<T: Any + Send + Sync + 'static>(
    registry: &mut Registry,
    reducer: impl Fn(&[T]) -> Result<T, ConcatError> + Send + Sync + 'static,
) {
    let boxed: Reducer<T> = Box::new(reducer);
    registry.reducers.insert(TypeId::of::<T>(), Box::new(boxed));
}

fn register_builtin_string(registry: &mut Registry) {
    insert_reducer::<String>(registry, |items| {
        let len: usize = items.iter().map(|s| s.len()).sum();
        let mut out = String::with_capacity(len);
        for s in items {
            out.push_str(s);
        }
        Ok(out)
    });
}

/// Registers the "numeric/bool/time take-last" built-ins the distilled spec
/// calls out by name: whichever fragment carries the value last in the
/// slice wins, with no conflict check (unlike the generic fallback, which
/// errors on more than one non-default value).
fn register_builtin_take_last(registry: &mut Registry) {
    macro_rules! take_last_for {
        ($($t:ty),+ $(,)?) => {
            $(
                insert_reducer::<$t>(registry, |items: &[$t]| {
                    items
                        .last()
                        .copied()
                        .ok_or(ConcatError::Unregistered)
                });
            )+
        };
    }
    take_last_for!(
        bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64
    );
}

/// Installs a reducer for `T`, keyed by `TypeId`. Must be called before the
/// first [`concat_items`]/[`concat_maps`] call for this `T` (or any `T` at
/// all, since the first use flips a process-wide flag).
///
/// # Panics
///
/// Panics if the registry has already been read by a concat call: this is a
/// programming error (§7), not a recoverable condition.
pub fn register<T: Any + Send + Sync + 'static>(
    reducer: impl Fn(&[T]) -> Result<T, ConcatError> + Send + Sync + 'static,
) {
    let mut registry = registry().lock().unwrap();
    assert!(
        !registry.used,
        "conflux::concat::register called after the registry was already read; \
         register every reducer at start-up, before any concat_* call"
    );
    insert_reducer(&mut registry, reducer);
}

/// Reduces `items` to a single `T`. Looks up a registered reducer first;
/// absent one, falls back to "at most one non-default element, else error."
pub fn concat_items<T>(items: &[T]) -> Result<T, ConcatError>
where
    T: Any + Send + Sync + Clone + Default + PartialEq + 'static,
{
    let mut registry = registry().lock().unwrap();
    registry.used = true;
    if let Some(boxed) = registry.reducers.get(&TypeId::of::<T>()) {
        let reducer = boxed
            .downcast_ref::<Reducer<T>>()
            .expect("TypeId-keyed reducer downcast cannot fail");
        return reducer(items);
    }
    drop(registry);
    fallback_take_single_non_default(items)
}

fn fallback_take_single_non_default<T: Clone + Default + PartialEq>(
    items: &[T],
) -> Result<T, ConcatError> {
    let default = T::default();
    let mut found: Option<&T> = None;
    for item in items {
        if *item != default {
            if found.is_some() {
                return Err(ConcatError::Unregistered);
            }
            found = Some(item);
        }
    }
    Ok(found.cloned().unwrap_or(default))
}

/// Groups values by key across every input map, in order. A key present in
/// exactly one map is copied through verbatim — including an explicit
/// `Value::Null`, which is a real value to this function, not an absence. A
/// key present in more than one map is reduced via [`concat_items`].
pub fn concat_maps<K, V>(maps: &[HashMap<K, V>]) -> Result<HashMap<K, V>, ConcatError>
where
    K: Hash + Eq + Clone,
    V: Any + Send + Sync + Clone + Default + PartialEq + 'static,
{
    let mut order: Vec<K> = Vec::new();
    let mut groups: HashMap<K, Vec<V>> = HashMap::new();
    for map in maps {
        for (k, v) in map {
            groups.entry(k.clone()).or_insert_with(|| {
                order.push(k.clone());
                Vec::new()
            });
            groups.get_mut(k).unwrap().push(v.clone());
        }
    }

    let mut out = HashMap::with_capacity(order.len());
    for k in order {
        let values = groups.remove(&k).expect("key was just recorded in `order`");
        let value = if values.len() == 1 {
            values.into_iter().next().unwrap()
        } else {
            concat_items(&values)?
        };
        out.insert(k, value);
    }
    Ok(out)
}
