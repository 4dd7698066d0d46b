//! Value extractors and the attribute value domain.
//!
//! An extractor derives one comparable attribute from a cache value. Indexes,
//! filters and the built-in aggregators all operate on `AttributeValue`, never
//! on raw values, so a single extractor definition serves all three.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A comparable attribute extracted from a cache value.
///
/// Total order: variants rank `Bool < Int < Float < Text`, and values compare
/// within a variant (`f64::total_cmp` for floats). An extractor should produce
/// one consistent variant per attribute; cross-variant comparisons are ordered
/// but never equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    fn rank(&self) -> u8 {
        match self {
            AttributeValue::Bool(_) => 0,
            AttributeValue::Int(_) => 1,
            AttributeValue::Float(_) => 2,
            AttributeValue::Text(_) => 3,
        }
    }

    /// Numeric view used by the averaging aggregator.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a == b,
            (AttributeValue::Int(a), AttributeValue::Int(b)) => a == b,
            (AttributeValue::Float(a), AttributeValue::Float(b)) => a.to_bits() == b.to_bits(),
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttributeValue {}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            AttributeValue::Bool(v) => v.hash(state),
            AttributeValue::Int(v) => v.hash(state),
            AttributeValue::Float(v) => v.to_bits().hash(state),
            AttributeValue::Text(v) => v.hash(state),
        }
    }
}

impl PartialOrd for AttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttributeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a.cmp(b),
            (AttributeValue::Int(a), AttributeValue::Int(b)) => a.cmp(b),
            (AttributeValue::Float(a), AttributeValue::Float(b)) => a.total_cmp(b),
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(v as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}

/// Per-entry extraction failure (e.g. a missing nested attribute).
///
/// Never fatal: the entry is excluded from the index or result set and a
/// warning is logged.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct ExtractError {
    pub reason: String,
}

impl ExtractError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Pure function deriving a comparable attribute from a cache value.
///
/// The `id` names the attribute and identifies the extractor for index
/// registration and removal: two extractors with the same id are treated as
/// the same attribute.
pub trait ValueExtractor<V>: Send + Sync + 'static {
    fn id(&self) -> &str;
    fn extract(&self, value: &V) -> Result<AttributeValue, ExtractError>;
}

/// Closure-backed extractor.
pub struct FnExtractor<V> {
    id: String,
    f: Arc<dyn Fn(&V) -> Result<AttributeValue, ExtractError> + Send + Sync>,
}

impl<V> FnExtractor<V> {
    pub fn new<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&V) -> Result<AttributeValue, ExtractError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            f: Arc::new(f),
        }
    }

    /// Convenience constructor for extractors that cannot fail.
    pub fn infallible<F, A>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&V) -> A + Send + Sync + 'static,
        A: Into<AttributeValue>,
    {
        Self::new(id, move |value| Ok(f(value).into()))
    }
}

impl<V> Clone for FnExtractor<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            f: self.f.clone(),
        }
    }
}

impl<V> fmt::Debug for FnExtractor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExtractor").field("id", &self.id).finish()
    }
}

impl<V: Send + Sync + 'static> ValueExtractor<V> for FnExtractor<V> {
    fn id(&self) -> &str {
        &self.id
    }

    fn extract(&self, value: &V) -> Result<AttributeValue, ExtractError> {
        (self.f)(value)
    }
}
