//! Index-aware filter evaluation.
//!
//! The planner resolves each leaf against a matching index when one exists
//! (equality against any index, ranges against ordered indexes) and falls
//! back to scanning for everything else. `and` nodes evaluate their cheaper
//! child first and use its result set to bound the other side; `or` unions;
//! `not` subtracts from the candidate set. Evaluating the same filter against
//! an unchanged cache state always yields the same key set.

use super::filter::{CompareOp, Filter};
use crate::index::extractor::AttributeValue;
use crate::index::manager::IndexRegistry;
use crate::types::{GridKey, GridValue};
use std::collections::{HashMap, HashSet};
use std::ops::Bound;

pub struct QueryPlanner;

impl QueryPlanner {
    /// Evaluates `filter` against the current cache contents, returning the
    /// set of matching keys. Entries whose extraction fails for a scanned
    /// predicate are excluded from the result and logged.
    pub fn evaluate<K: GridKey, V: GridValue>(
        filter: &Filter<V>,
        indexes: &IndexRegistry<K, V>,
        entries: &HashMap<K, V>,
    ) -> HashSet<K> {
        eval(filter, indexes, entries, None)
    }
}

fn eval<K: GridKey, V: GridValue>(
    filter: &Filter<V>,
    indexes: &IndexRegistry<K, V>,
    entries: &HashMap<K, V>,
    bound: Option<&HashSet<K>>,
) -> HashSet<K> {
    match filter {
        Filter::Always => match bound {
            Some(keys) => keys.clone(),
            None => entries.keys().cloned().collect(),
        },
        Filter::Compare {
            extractor,
            op,
            value,
        } => {
            let id = extractor.id();
            match op {
                CompareOp::Equal if indexes.has_index(id) => {
                    let hits = indexes
                        .with_index(id, |index| index.lookup(value))
                        .unwrap_or_default();
                    restrict(hits, bound)
                }
                CompareOp::Greater | CompareOp::GreaterEqual
                    if indexes.has_ordered_index(id) =>
                {
                    let lower = range_lower(*op, value);
                    let hits = indexes
                        .with_index(id, |index| index.lookup_range(lower, Bound::Unbounded))
                        .unwrap_or_default();
                    restrict(hits, bound)
                }
                CompareOp::Less | CompareOp::LessEqual if indexes.has_ordered_index(id) => {
                    let upper = range_upper(*op, value);
                    let hits = indexes
                        .with_index(id, |index| index.lookup_range(Bound::Unbounded, upper))
                        .unwrap_or_default();
                    restrict(hits, bound)
                }
                // NotEqual and unindexed leaves scan: the complement of an
                // index posting would wrongly include extraction failures.
                _ => scan(filter, entries, bound),
            }
        }
        Filter::Between {
            extractor,
            lower,
            upper,
        } => {
            let id = extractor.id();
            if indexes.has_ordered_index(id) {
                let hits = indexes
                    .with_index(id, |index| {
                        index.lookup_range(Bound::Included(lower), Bound::Included(upper))
                    })
                    .unwrap_or_default();
                restrict(hits, bound)
            } else {
                scan(filter, entries, bound)
            }
        }
        Filter::Like { .. } => scan(filter, entries, bound),
        Filter::And(left, right) => {
            // Cheapest child first; its result bounds the other side. Ties
            // keep left-to-right order so evaluation stays deterministic.
            let left_cost = estimate(left, indexes, entries.len());
            let right_cost = estimate(right, indexes, entries.len());
            let (first, second) = if right_cost < left_cost {
                (right.as_ref(), left.as_ref())
            } else {
                (left.as_ref(), right.as_ref())
            };
            let narrowed = eval(first, indexes, entries, bound);
            if narrowed.is_empty() {
                return narrowed;
            }
            eval(second, indexes, entries, Some(&narrowed))
        }
        Filter::Or(left, right) => {
            let mut result = eval(left, indexes, entries, bound);
            result.extend(eval(right, indexes, entries, bound));
            result
        }
        Filter::Not(child) => {
            let base: HashSet<K> = match bound {
                Some(keys) => keys.clone(),
                None => entries.keys().cloned().collect(),
            };
            let matched = eval(child, indexes, entries, bound);
            base.difference(&matched).cloned().collect()
        }
    }
}

/// Full (or bounded) scan applying the predicate to every candidate entry.
fn scan<K: GridKey, V: GridValue>(
    filter: &Filter<V>,
    entries: &HashMap<K, V>,
    bound: Option<&HashSet<K>>,
) -> HashSet<K> {
    let mut result = HashSet::new();
    let mut check = |key: &K, value: &V| match filter.evaluate(value) {
        Ok(true) => {
            result.insert(key.clone());
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(reason = %e, "extraction failed during scan; entry excluded from result");
        }
    };
    match bound {
        Some(keys) => {
            for key in keys {
                if let Some(value) = entries.get(key) {
                    check(key, value);
                }
            }
        }
        None => {
            for (key, value) in entries {
                check(key, value);
            }
        }
    }
    result
}

/// Estimated result size used to order `and` children. Indexed leaves report
/// their current posting sizes; anything that needs a scan reports the full
/// entry count so indexed children always win.
fn estimate<K: GridKey, V: GridValue>(
    filter: &Filter<V>,
    indexes: &IndexRegistry<K, V>,
    total: usize,
) -> usize {
    match filter {
        Filter::Always => total,
        Filter::Compare {
            extractor,
            op,
            value,
        } => {
            let id = extractor.id();
            match op {
                CompareOp::Equal if indexes.has_index(id) => indexes
                    .with_index(id, |index| index.cardinality(value))
                    .unwrap_or(total),
                CompareOp::Greater | CompareOp::GreaterEqual
                    if indexes.has_ordered_index(id) =>
                {
                    indexes
                        .with_index(id, |index| {
                            index.range_cardinality(range_lower(*op, value), Bound::Unbounded)
                        })
                        .unwrap_or(total)
                }
                CompareOp::Less | CompareOp::LessEqual if indexes.has_ordered_index(id) => {
                    indexes
                        .with_index(id, |index| {
                            index.range_cardinality(Bound::Unbounded, range_upper(*op, value))
                        })
                        .unwrap_or(total)
                }
                _ => total,
            }
        }
        Filter::Between {
            extractor,
            lower,
            upper,
        } => {
            let id = extractor.id();
            if indexes.has_ordered_index(id) {
                indexes
                    .with_index(id, |index| {
                        index.range_cardinality(Bound::Included(lower), Bound::Included(upper))
                    })
                    .unwrap_or(total)
            } else {
                total
            }
        }
        Filter::Like { .. } => total,
        Filter::And(left, right) => {
            estimate(left, indexes, total).min(estimate(right, indexes, total))
        }
        Filter::Or(left, right) => {
            estimate(left, indexes, total).saturating_add(estimate(right, indexes, total))
        }
        Filter::Not(_) => total,
    }
}

fn restrict<K: GridKey>(hits: HashSet<K>, bound: Option<&HashSet<K>>) -> HashSet<K> {
    match bound {
        Some(keys) => hits.into_iter().filter(|k| keys.contains(k)).collect(),
        None => hits,
    }
}

fn range_lower(op: CompareOp, value: &AttributeValue) -> Bound<&AttributeValue> {
    match op {
        CompareOp::Greater => Bound::Excluded(value),
        _ => Bound::Included(value),
    }
}

fn range_upper(op: CompareOp, value: &AttributeValue) -> Bound<&AttributeValue> {
    match op {
        CompareOp::Less => Bound::Excluded(value),
        _ => Bound::Included(value),
    }
}
