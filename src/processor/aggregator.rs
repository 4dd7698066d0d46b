//! Server-side aggregation over cache entries.
//!
//! An aggregator folds the entries of each partition into a partial, then
//! combines the partials into one final result. Partials are computed where
//! the data lives, so only the small partial state crosses partition
//! boundaries. Entries whose extraction fails are skipped with a warning;
//! they reduce the population rather than failing the aggregation.

use crate::index::extractor::{AttributeValue, ValueExtractor};
use std::sync::Arc;

pub trait Aggregator<K, V>: Send + Sync + 'static {
    /// Per-partition accumulation state.
    type Partial: Send + 'static;
    type Output: Send + 'static;

    fn initial(&self) -> Self::Partial;

    /// Folds one entry into a partition's partial.
    fn accumulate(&self, partial: &mut Self::Partial, key: &K, value: &V);

    /// Merges two partials. Must be associative and insensitive to the order
    /// in which partitions report.
    fn combine(&self, left: Self::Partial, right: Self::Partial) -> Self::Partial;

    fn finish(&self, partial: Self::Partial) -> Self::Output;
}

/// Counts matching entries.
pub struct Count;

impl<K, V> Aggregator<K, V> for Count
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Partial = u64;
    type Output = u64;

    fn initial(&self) -> u64 {
        0
    }

    fn accumulate(&self, partial: &mut u64, _key: &K, _value: &V) {
        *partial += 1;
    }

    fn combine(&self, left: u64, right: u64) -> u64 {
        left + right
    }

    fn finish(&self, partial: u64) -> u64 {
        partial
    }
}

/// Smallest extracted attribute across matching entries, by the attribute
/// total order. `None` when no entry yielded an attribute.
pub struct AttributeMin<V> {
    extractor: Arc<dyn ValueExtractor<V>>,
}

impl<V> AttributeMin<V> {
    pub fn new(extractor: Arc<dyn ValueExtractor<V>>) -> Self {
        Self { extractor }
    }
}

impl<K, V> Aggregator<K, V> for AttributeMin<V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Partial = Option<AttributeValue>;
    type Output = Option<AttributeValue>;

    fn initial(&self) -> Option<AttributeValue> {
        None
    }

    fn accumulate(&self, partial: &mut Option<AttributeValue>, _key: &K, value: &V) {
        match self.extractor.extract(value) {
            Ok(attr) => match partial {
                Some(current) if *current <= attr => {}
                _ => *partial = Some(attr),
            },
            Err(e) => {
                tracing::warn!(extractor = self.extractor.id(), reason = %e, "extraction failed; entry skipped");
            }
        }
    }

    fn combine(
        &self,
        left: Option<AttributeValue>,
        right: Option<AttributeValue>,
    ) -> Option<AttributeValue> {
        match (left, right) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn finish(&self, partial: Option<AttributeValue>) -> Option<AttributeValue> {
        partial
    }
}

/// Largest extracted attribute across matching entries.
pub struct AttributeMax<V> {
    extractor: Arc<dyn ValueExtractor<V>>,
}

impl<V> AttributeMax<V> {
    pub fn new(extractor: Arc<dyn ValueExtractor<V>>) -> Self {
        Self { extractor }
    }
}

impl<K, V> Aggregator<K, V> for AttributeMax<V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Partial = Option<AttributeValue>;
    type Output = Option<AttributeValue>;

    fn initial(&self) -> Option<AttributeValue> {
        None
    }

    fn accumulate(&self, partial: &mut Option<AttributeValue>, _key: &K, value: &V) {
        match self.extractor.extract(value) {
            Ok(attr) => match partial {
                Some(current) if *current >= attr => {}
                _ => *partial = Some(attr),
            },
            Err(e) => {
                tracing::warn!(extractor = self.extractor.id(), reason = %e, "extraction failed; entry skipped");
            }
        }
    }

    fn combine(
        &self,
        left: Option<AttributeValue>,
        right: Option<AttributeValue>,
    ) -> Option<AttributeValue> {
        match (left, right) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn finish(&self, partial: Option<AttributeValue>) -> Option<AttributeValue> {
        partial
    }
}

/// Mean of a numeric attribute across matching entries.
///
/// The partial carries (sum, count) rather than a per-partition mean, so the
/// final mean is weighted correctly when partitions hold different numbers of
/// entries. Non-numeric attributes and failed extractions are skipped.
pub struct AttributeAverage<V> {
    extractor: Arc<dyn ValueExtractor<V>>,
}

impl<V> AttributeAverage<V> {
    pub fn new(extractor: Arc<dyn ValueExtractor<V>>) -> Self {
        Self { extractor }
    }
}

impl<K, V> Aggregator<K, V> for AttributeAverage<V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Partial = (f64, u64);
    type Output = Option<f64>;

    fn initial(&self) -> (f64, u64) {
        (0.0, 0)
    }

    fn accumulate(&self, partial: &mut (f64, u64), _key: &K, value: &V) {
        match self.extractor.extract(value) {
            Ok(attr) => match attr.as_f64() {
                Some(v) => {
                    partial.0 += v;
                    partial.1 += 1;
                }
                None => {
                    tracing::warn!(
                        extractor = self.extractor.id(),
                        "non-numeric attribute; entry skipped"
                    );
                }
            },
            Err(e) => {
                tracing::warn!(extractor = self.extractor.id(), reason = %e, "extraction failed; entry skipped");
            }
        }
    }

    fn combine(&self, left: (f64, u64), right: (f64, u64)) -> (f64, u64) {
        (left.0 + right.0, left.1 + right.1)
    }

    fn finish(&self, partial: (f64, u64)) -> Option<f64> {
        if partial.1 == 0 {
            None
        } else {
            Some(partial.0 / partial.1 as f64)
        }
    }
}
