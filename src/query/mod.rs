//! Query Module
//!
//! Filter trees and index-aware evaluation.
//!
//! ## Core Concepts
//! - **Filters**: Composable predicates (`equal`, ranges, `like`, and/or/not) over
//!   extracted attributes.
//! - **Planning**: Equality leaves resolve against any index, range leaves against
//!   ordered indexes; everything else scans. `and` evaluates its cheaper child first.

pub mod filter;
pub mod planner;

#[cfg(test)]
mod tests;
