//! Composable predicate trees over extracted entry attributes.
//!
//! Leaves compare one extracted attribute against a constant; internal nodes
//! combine child predicates with and/or/not. A filter is immutable once
//! built, so it can be shared between a query, a listener subscription, and
//! an `invoke_all` selection without copying.

use crate::error::{GridError, GridResult};
use crate::index::extractor::{AttributeValue, ExtractError, ValueExtractor};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

/// Immutable predicate tree evaluated against cache values, either directly
/// (full scan, event matching) or via the query planner against indexes.
pub enum Filter<V> {
    /// Matches every entry (the wildcard subscription / selection).
    Always,
    Compare {
        extractor: Arc<dyn ValueExtractor<V>>,
        op: CompareOp,
        value: AttributeValue,
    },
    /// Inclusive on both ends.
    Between {
        extractor: Arc<dyn ValueExtractor<V>>,
        lower: AttributeValue,
        upper: AttributeValue,
    },
    /// SQL-style pattern over text attributes: `%` matches any run of
    /// characters, `_` a single character, `\` escapes either.
    Like {
        extractor: Arc<dyn ValueExtractor<V>>,
        pattern: String,
        regex: Regex,
    },
    And(Box<Filter<V>>, Box<Filter<V>>),
    Or(Box<Filter<V>>, Box<Filter<V>>),
    Not(Box<Filter<V>>),
}

impl<V: 'static> Filter<V> {
    pub fn equal(
        extractor: impl ValueExtractor<V>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::compare(extractor, CompareOp::Equal, value)
    }

    pub fn not_equal(
        extractor: impl ValueExtractor<V>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::compare(extractor, CompareOp::NotEqual, value)
    }

    pub fn greater(
        extractor: impl ValueExtractor<V>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::compare(extractor, CompareOp::Greater, value)
    }

    pub fn greater_equal(
        extractor: impl ValueExtractor<V>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::compare(extractor, CompareOp::GreaterEqual, value)
    }

    pub fn less(extractor: impl ValueExtractor<V>, value: impl Into<AttributeValue>) -> Self {
        Self::compare(extractor, CompareOp::Less, value)
    }

    pub fn less_equal(
        extractor: impl ValueExtractor<V>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::compare(extractor, CompareOp::LessEqual, value)
    }

    pub fn compare(
        extractor: impl ValueExtractor<V>,
        op: CompareOp,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Filter::Compare {
            extractor: Arc::new(extractor),
            op,
            value: value.into(),
        }
    }

    pub fn between(
        extractor: impl ValueExtractor<V>,
        lower: impl Into<AttributeValue>,
        upper: impl Into<AttributeValue>,
    ) -> Self {
        Filter::Between {
            extractor: Arc::new(extractor),
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    /// Builds a `Like` filter, compiling the pattern up front so evaluation
    /// is infallible. An invalid pattern is rejected here.
    pub fn like(extractor: impl ValueExtractor<V>, pattern: impl Into<String>) -> GridResult<Self> {
        let pattern = pattern.into();
        let regex = compile_like_pattern(&pattern)?;
        Ok(Filter::Like {
            extractor: Arc::new(extractor),
            pattern,
            regex,
        })
    }

    pub fn and(self, other: Filter<V>) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter<V>) -> Self {
        Filter::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Direct evaluation against one value. Extraction failures propagate so
    /// the caller can decide between "exclude and warn" (scans, listener
    /// matching) and surfacing the failure.
    pub fn evaluate(&self, value: &V) -> Result<bool, ExtractError> {
        match self {
            Filter::Always => Ok(true),
            Filter::Compare {
                extractor,
                op,
                value: target,
            } => {
                let extracted = extractor.extract(value)?;
                Ok(compare_matches(*op, &extracted, target))
            }
            Filter::Between {
                extractor,
                lower,
                upper,
            } => {
                let extracted = extractor.extract(value)?;
                Ok(extracted >= *lower && extracted <= *upper)
            }
            Filter::Like {
                extractor, regex, ..
            } => {
                let extracted = extractor.extract(value)?;
                Ok(extracted
                    .as_text()
                    .map(|text| regex.is_match(text))
                    .unwrap_or(false))
            }
            Filter::And(left, right) => Ok(left.evaluate(value)? && right.evaluate(value)?),
            Filter::Or(left, right) => Ok(left.evaluate(value)? || right.evaluate(value)?),
            Filter::Not(child) => Ok(!child.evaluate(value)?),
        }
    }
}

fn compare_matches(op: CompareOp, extracted: &AttributeValue, target: &AttributeValue) -> bool {
    match op {
        CompareOp::Equal => extracted == target,
        CompareOp::NotEqual => extracted != target,
        CompareOp::Greater => extracted > target,
        CompareOp::GreaterEqual => extracted >= target,
        CompareOp::Less => extracted < target,
        CompareOp::LessEqual => extracted <= target,
    }
}

/// Translates a `%`/`_` wildcard pattern into an anchored regex.
fn compile_like_pattern(pattern: &str) -> GridResult<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => expr.push_str(&regex::escape(&escaped.to_string())),
                None => {
                    return Err(GridError::ExtractionFailure {
                        extractor: "like".to_string(),
                        reason: "pattern ends with a dangling escape".to_string(),
                    })
                }
            },
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| GridError::ExtractionFailure {
        extractor: "like".to_string(),
        reason: format!("invalid pattern '{pattern}': {e}"),
    })
}

impl<V> Clone for Filter<V> {
    fn clone(&self) -> Self {
        match self {
            Filter::Always => Filter::Always,
            Filter::Compare {
                extractor,
                op,
                value,
            } => Filter::Compare {
                extractor: extractor.clone(),
                op: *op,
                value: value.clone(),
            },
            Filter::Between {
                extractor,
                lower,
                upper,
            } => Filter::Between {
                extractor: extractor.clone(),
                lower: lower.clone(),
                upper: upper.clone(),
            },
            Filter::Like {
                extractor,
                pattern,
                regex,
            } => Filter::Like {
                extractor: extractor.clone(),
                pattern: pattern.clone(),
                regex: regex.clone(),
            },
            Filter::And(left, right) => Filter::And(left.clone(), right.clone()),
            Filter::Or(left, right) => Filter::Or(left.clone(), right.clone()),
            Filter::Not(child) => Filter::Not(child.clone()),
        }
    }
}

impl<V: 'static> fmt::Debug for Filter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Always => write!(f, "Always"),
            Filter::Compare {
                extractor,
                op,
                value,
            } => write!(f, "Compare({} {:?} {:?})", extractor.id(), op, value),
            Filter::Between {
                extractor,
                lower,
                upper,
            } => write!(f, "Between({} in [{:?}, {:?}])", extractor.id(), lower, upper),
            Filter::Like {
                extractor, pattern, ..
            } => write!(f, "Like({} ~ '{}')", extractor.id(), pattern),
            Filter::And(left, right) => write!(f, "And({:?}, {:?})", left, right),
            Filter::Or(left, right) => write!(f, "Or({:?}, {:?})", left, right),
            Filter::Not(child) => write!(f, "Not({:?})", child),
        }
    }
}
