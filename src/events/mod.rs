//! Entry Event Module
//!
//! Two-phase mutation events with veto semantics.
//!
//! ## Core Concepts
//! - **Phases**: Every mutation fires a pre-commit `*ing` event and a post-commit `*ed` event.
//! - **Interceptors**: Pre-commit hooks may veto, aborting the mutation entirely.
//! - **Listeners**: Post-commit observers; their failures are logged, never propagated.
//! - **Scopes**: Subscriptions target one key, a filter, or the whole cache, optionally lite.

pub mod dispatcher;
pub mod types;
