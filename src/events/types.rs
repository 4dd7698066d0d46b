use crate::query::filter::Filter;
use std::fmt;
use std::sync::Arc;

/// Lifecycle phase of one entry mutation. Each mutation kind is a two-phase
/// sequence: the `*ing` event fires before the commit (and may be vetoed by
/// an interceptor), the `*ed` event fires after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Inserting,
    Inserted,
    Updating,
    Updated,
    Removing,
    Removed,
}

impl EventKind {
    /// True for the pre-commit phase of the sequence.
    pub fn is_pre_commit(&self) -> bool {
        matches!(
            self,
            EventKind::Inserting | EventKind::Updating | EventKind::Removing
        )
    }

    /// The post-commit counterpart of a pre-commit kind.
    pub fn committed(&self) -> EventKind {
        match self {
            EventKind::Inserting => EventKind::Inserted,
            EventKind::Updating => EventKind::Updated,
            EventKind::Removing => EventKind::Removed,
            other => *other,
        }
    }
}

/// One entry mutation event. `old_value`/`new_value` are `None` where the
/// phase has no such state (no old value on insert, no new value on remove)
/// or when delivered through a lite subscription.
#[derive(Debug, Clone)]
pub struct MapEvent<K, V> {
    pub cache: String,
    pub kind: EventKind,
    pub key: K,
    pub old_value: Option<V>,
    pub new_value: Option<V>,
}

impl<K: Clone, V> MapEvent<K, V> {
    /// Key-only copy of this event, as delivered to lite subscriptions.
    pub fn lite(&self) -> Self
    where
        V: Clone,
    {
        Self {
            cache: self.cache.clone(),
            kind: self.kind,
            key: self.key.clone(),
            old_value: None,
            new_value: None,
        }
    }
}

/// Rejection returned by a pre-commit interceptor; aborts the mutation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct VetoError {
    pub reason: String,
}

impl VetoError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Pre-commit hook. Runs synchronously inside the mutating operation's
/// critical section, before anything is applied; returning an error vetoes
/// the whole mutation (no backing-map, index, or store change happens).
///
/// Interceptors must not re-enter the cache: they run under the entry's
/// partition lock.
pub trait EventInterceptor<K, V>: Send + Sync {
    fn before_commit(&self, event: &MapEvent<K, V>) -> Result<(), VetoError>;
}

/// Post-commit observer. Runs synchronously after the mutation committed; an
/// error is logged and swallowed — it never undoes the mutation and never
/// reaches the mutating caller. Same re-entrancy rule as interceptors.
pub trait MapListener<K, V>: Send + Sync {
    fn on_event(&self, event: &MapEvent<K, V>) -> anyhow::Result<()>;
}

/// Closure adapter for `EventInterceptor`.
pub struct FnInterceptor<F> {
    f: F,
}

impl<F> FnInterceptor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<K, V, F> EventInterceptor<K, V> for FnInterceptor<F>
where
    F: Fn(&MapEvent<K, V>) -> Result<(), VetoError> + Send + Sync,
{
    fn before_commit(&self, event: &MapEvent<K, V>) -> Result<(), VetoError> {
        (self.f)(event)
    }
}

/// Closure adapter for `MapListener`.
pub struct FnListener<F> {
    f: F,
}

impl<F> FnListener<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<K, V, F> MapListener<K, V> for FnListener<F>
where
    F: Fn(&MapEvent<K, V>) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &MapEvent<K, V>) -> anyhow::Result<()> {
        (self.f)(event)
    }
}

/// What a listener subscribes to: one key, a filter over the affected value,
/// or everything. `lite` strips old/new values from delivered events.
pub struct ListenerScope<K, V> {
    pub(crate) key: Option<K>,
    pub(crate) filter: Option<Filter<V>>,
    pub(crate) lite: bool,
}

impl<K, V> ListenerScope<K, V> {
    /// Wildcard: all entries of the cache.
    pub fn all() -> Self {
        Self {
            key: None,
            filter: None,
            lite: false,
        }
    }

    pub fn key(key: K) -> Self {
        Self {
            key: Some(key),
            filter: None,
            lite: false,
        }
    }

    pub fn filtered(filter: Filter<V>) -> Self {
        Self {
            key: None,
            filter: Some(filter),
            lite: false,
        }
    }

    pub fn lite(mut self) -> Self {
        self.lite = true;
        self
    }
}

/// Handle identifying one listener or interceptor registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub String);

impl RegistrationId {
    pub(crate) fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) type SharedInterceptor<K, V> = Arc<dyn EventInterceptor<K, V>>;
pub(crate) type SharedListener<K, V> = Arc<dyn MapListener<K, V>>;
