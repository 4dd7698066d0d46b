use crate::error::GridError;
use std::collections::HashMap;
use std::marker::PhantomData;

/// The mutable view of one entry handed to an entry processor.
///
/// The processor reads the current value, and may stage a new value or a
/// removal; nothing touches the backing map until the processor returns
/// successfully, so a failing processor leaves the entry untouched.
pub struct ProcessorEntry<K, V> {
    key: K,
    original: Option<V>,
    pending: Pending<V>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Pending<V> {
    Untouched,
    Set(V),
    Remove,
}

impl<K, V> ProcessorEntry<K, V> {
    pub(crate) fn new(key: K, original: Option<V>) -> Self {
        Self {
            key,
            original,
            pending: Pending::Untouched,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// The entry's value as the processor currently sees it, reflecting any
    /// staged `set_value`/`remove`.
    pub fn value(&self) -> Option<&V> {
        match &self.pending {
            Pending::Untouched => self.original.as_ref(),
            Pending::Set(value) => Some(value),
            Pending::Remove => None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.value().is_some()
    }

    /// Stages a new value for the entry.
    pub fn set_value(&mut self, value: V) {
        self.pending = Pending::Set(value);
    }

    /// Stages removal of the entry. A removal staged for an absent entry is
    /// a no-op at commit time.
    pub fn remove(&mut self) {
        self.pending = Pending::Remove;
    }

    pub(crate) fn into_outcome(self) -> (Option<V>, Pending<V>) {
        (self.original, self.pending)
    }
}

/// Server-side function executed against one entry with exclusive
/// read-modify-write access. The whole read-modify-write-notify sequence for
/// the entry is atomic: on failure, no partial mutation is visible.
pub trait EntryProcessor<K, V>: Send + Sync + 'static {
    type Output: Send + 'static;

    fn process(&self, entry: &mut ProcessorEntry<K, V>) -> anyhow::Result<Self::Output>;
}

/// Closure adapter for `EntryProcessor`.
pub struct FnProcessor<F, R> {
    f: F,
    _output: PhantomData<fn() -> R>,
}

impl<F, R> FnProcessor<F, R> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _output: PhantomData,
        }
    }
}

impl<K, V, F, R> EntryProcessor<K, V> for FnProcessor<F, R>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    F: Fn(&mut ProcessorEntry<K, V>) -> anyhow::Result<R> + Send + Sync + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn process(&self, entry: &mut ProcessorEntry<K, V>) -> anyhow::Result<R> {
        (self.f)(entry)
    }
}

/// Outcome of a multi-key invocation. Entries are processed independently:
/// a failure on one key never aborts the others, so callers get a per-key
/// result map and a per-key error map instead of one aggregate failure.
#[derive(Debug)]
pub struct InvocationResults<K, R> {
    pub results: HashMap<K, R>,
    pub errors: HashMap<K, GridError>,
}

impl<K, R> InvocationResults<K, R> {
    pub(crate) fn new() -> Self {
        Self {
            results: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn is_fully_successful(&self) -> bool {
        self.errors.is_empty()
    }
}
