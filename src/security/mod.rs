//! Role-neutral access control hooks.
//!
//! A `StorageAccessAuthorizer` is consulted before any read or write is
//! permitted; returning an error denies the operation with `AccessDenied`.
//! The authorizer is a policy object configured per cache at registration
//! time — there are no ambient user/role singletons, and no wrapper-cache
//! chains: the storage pipeline and the façade call the hook directly.

use std::collections::BTreeSet;

/// The identity an operation runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_roles<I, S>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Why the grid is asking for access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    Get,
    Put,
    Remove,
    Invoke,
    Aggregate,
    Query,
    Load,
}

/// Denial returned by an authorizer; maps to `GridError::AccessDenied`,
/// which is fatal to the single operation and never retried.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct AccessDenial {
    pub reason: String,
}

impl AccessDenial {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Access-control hook invoked before reads and writes.
///
/// The per-entry variants run inside the entry's critical section with the
/// current value (if any); the `*_any` variants guard cache-wide operations
/// such as queries and multi-key invocations.
pub trait StorageAccessAuthorizer<K, V>: Send + Sync {
    fn check_read(
        &self,
        cache: &str,
        key: &K,
        value: Option<&V>,
        principal: &Principal,
        reason: AccessReason,
    ) -> Result<(), AccessDenial>;

    fn check_write(
        &self,
        cache: &str,
        key: &K,
        value: Option<&V>,
        principal: &Principal,
        reason: AccessReason,
    ) -> Result<(), AccessDenial>;

    fn check_read_any(
        &self,
        cache: &str,
        principal: &Principal,
        reason: AccessReason,
    ) -> Result<(), AccessDenial>;

    fn check_write_any(
        &self,
        cache: &str,
        principal: &Principal,
        reason: AccessReason,
    ) -> Result<(), AccessDenial>;
}
