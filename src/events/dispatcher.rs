//! Listener and interceptor registry plus synchronous event delivery.
//!
//! Dispatch runs inline on the mutating thread, inside the entry's partition
//! critical section. The asymmetry between the two phases is load-bearing:
//! a pre-commit rejection aborts the mutation and surfaces to the caller,
//! while a post-commit failure is logged and swallowed because the mutation
//! has already committed and must stay visible.

use super::types::{
    EventKind, ListenerScope, MapEvent, RegistrationId, SharedInterceptor, SharedListener,
    VetoError,
};
use crate::types::{GridKey, GridValue};
use parking_lot::RwLock;

struct InterceptorEntry<K, V> {
    id: RegistrationId,
    interceptor: SharedInterceptor<K, V>,
}

struct ListenerEntry<K, V> {
    id: RegistrationId,
    scope: ListenerScope<K, V>,
    listener: SharedListener<K, V>,
}

/// Per-cache event dispatcher. Registrations are invoked in registration
/// order within their phase.
pub struct EventDispatcher<K, V> {
    interceptors: RwLock<Vec<InterceptorEntry<K, V>>>,
    listeners: RwLock<Vec<ListenerEntry<K, V>>>,
}

impl<K: GridKey, V: GridValue> EventDispatcher<K, V> {
    pub fn new() -> Self {
        Self {
            interceptors: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_interceptor(&self, interceptor: SharedInterceptor<K, V>) -> RegistrationId {
        let id = RegistrationId::new();
        self.interceptors.write().push(InterceptorEntry {
            id: id.clone(),
            interceptor,
        });
        tracing::debug!(registration = %id, "interceptor registered");
        id
    }

    pub fn remove_interceptor(&self, id: &RegistrationId) -> bool {
        let mut interceptors = self.interceptors.write();
        let before = interceptors.len();
        interceptors.retain(|entry| entry.id != *id);
        interceptors.len() != before
    }

    pub fn add_listener(
        &self,
        listener: SharedListener<K, V>,
        scope: ListenerScope<K, V>,
    ) -> RegistrationId {
        let id = RegistrationId::new();
        self.listeners.write().push(ListenerEntry {
            id: id.clone(),
            scope,
            listener,
        });
        tracing::debug!(registration = %id, "listener registered");
        id
    }

    pub fn remove_listener(&self, id: &RegistrationId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != *id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Delivers a pre-commit event to every interceptor in registration
    /// order. The first rejection wins and aborts the mutation.
    pub fn dispatch_pre_commit(&self, event: &MapEvent<K, V>) -> Result<(), VetoError> {
        debug_assert!(event.kind.is_pre_commit());
        for entry in self.interceptors.read().iter() {
            entry.interceptor.before_commit(event)?;
        }
        Ok(())
    }

    /// Delivers a post-commit event to every matching listener in
    /// registration order. Listener failures are logged, never propagated.
    pub fn dispatch_post_commit(&self, event: &MapEvent<K, V>) {
        debug_assert!(!event.kind.is_pre_commit());
        for entry in self.listeners.read().iter() {
            if !scope_matches(&entry.scope, event) {
                continue;
            }
            let delivered = if entry.scope.lite {
                entry.listener.on_event(&event.lite())
            } else {
                entry.listener.on_event(event)
            };
            if let Err(e) = delivered {
                tracing::warn!(
                    registration = %entry.id,
                    cache = %event.cache,
                    kind = ?event.kind,
                    error = %e,
                    "post-commit listener failed; mutation stands"
                );
            }
        }
    }
}

impl<K: GridKey, V: GridValue> Default for EventDispatcher<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A filter subscription is matched against the value the event is "about":
/// the new value for inserts/updates, the old value for removals. Extraction
/// failures exclude the event from that subscription.
fn scope_matches<K: GridKey, V: GridValue>(
    scope: &ListenerScope<K, V>,
    event: &MapEvent<K, V>,
) -> bool {
    if let Some(key) = &scope.key {
        if *key != event.key {
            return false;
        }
    }
    if let Some(filter) = &scope.filter {
        let subject = match event.kind {
            EventKind::Removed | EventKind::Removing => event.old_value.as_ref(),
            _ => event.new_value.as_ref(),
        };
        let Some(value) = subject else {
            return false;
        };
        match filter.evaluate(value) {
            Ok(matched) => return matched,
            Err(e) => {
                tracing::warn!(reason = %e, "extraction failed matching listener filter; event skipped");
                return false;
            }
        }
    }
    true
}
