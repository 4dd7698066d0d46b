//! Server-side context of one named cache.
//!
//! Everything a storage node needs while committing a mutation for a cache
//! lives here: the index registry, the event dispatcher, and the optional
//! cache-store and authorizer hooks. Contexts are created once per cache at
//! registration and shared across all nodes of the service.

use crate::error::{GridError, GridResult};
use crate::events::dispatcher::EventDispatcher;
use crate::index::manager::IndexRegistry;
use crate::security::{AccessReason, Principal, StorageAccessAuthorizer};
use crate::storage::store::CacheStore;
use crate::types::{GridKey, GridValue};
use std::sync::Arc;

/// Optional per-cache wiring, supplied when the cache is first registered.
pub struct CacheOptions<K, V> {
    pub store: Option<Arc<dyn CacheStore<K, V>>>,
    pub authorizer: Option<Arc<dyn StorageAccessAuthorizer<K, V>>>,
}

impl<K, V> Default for CacheOptions<K, V> {
    fn default() -> Self {
        Self {
            store: None,
            authorizer: None,
        }
    }
}

impl<K, V> CacheOptions<K, V> {
    pub fn with_store(mut self, store: Arc<dyn CacheStore<K, V>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn StorageAccessAuthorizer<K, V>>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }
}

pub struct CacheContext<K, V> {
    pub name: String,
    pub indexes: IndexRegistry<K, V>,
    pub events: EventDispatcher<K, V>,
    pub store: Option<Arc<dyn CacheStore<K, V>>>,
    pub authorizer: Option<Arc<dyn StorageAccessAuthorizer<K, V>>>,
}

impl<K: GridKey, V: GridValue> CacheContext<K, V> {
    pub fn new(name: impl Into<String>, options: CacheOptions<K, V>) -> Self {
        Self {
            name: name.into(),
            indexes: IndexRegistry::new(),
            events: EventDispatcher::new(),
            store: options.store,
            authorizer: options.authorizer,
        }
    }

    pub(crate) fn check_read(
        &self,
        key: &K,
        value: Option<&V>,
        principal: &Principal,
        reason: AccessReason,
    ) -> GridResult<()> {
        if let Some(authorizer) = &self.authorizer {
            authorizer
                .check_read(&self.name, key, value, principal, reason)
                .map_err(|denial| GridError::AccessDenied {
                    principal: principal.name.clone(),
                    reason: denial.reason,
                })?;
        }
        Ok(())
    }

    pub(crate) fn check_write(
        &self,
        key: &K,
        value: Option<&V>,
        principal: &Principal,
        reason: AccessReason,
    ) -> GridResult<()> {
        if let Some(authorizer) = &self.authorizer {
            authorizer
                .check_write(&self.name, key, value, principal, reason)
                .map_err(|denial| GridError::AccessDenied {
                    principal: principal.name.clone(),
                    reason: denial.reason,
                })?;
        }
        Ok(())
    }

    pub(crate) fn check_read_any(
        &self,
        principal: &Principal,
        reason: AccessReason,
    ) -> GridResult<()> {
        if let Some(authorizer) = &self.authorizer {
            authorizer
                .check_read_any(&self.name, principal, reason)
                .map_err(|denial| GridError::AccessDenied {
                    principal: principal.name.clone(),
                    reason: denial.reason,
                })?;
        }
        Ok(())
    }

    pub(crate) fn check_write_any(
        &self,
        principal: &Principal,
        reason: AccessReason,
    ) -> GridResult<()> {
        if let Some(authorizer) = &self.authorizer {
            authorizer
                .check_write_any(&self.name, principal, reason)
                .map_err(|denial| GridError::AccessDenied {
                    principal: principal.name.clone(),
                    reason: denial.reason,
                })?;
        }
        Ok(())
    }
}
