//! Entry Processing Module
//!
//! Server-side computation shipped to the data.
//!
//! ## Core Concepts
//! - **Processors**: An `EntryProcessor` mutates one entry under exclusive access;
//!   multi-key invocations fan out per partition and fail per key, never globally.
//! - **Aggregators**: Fold entries into per-partition partials, then combine; built-ins
//!   cover count, min, max, and weighted average over extracted attributes.

pub mod aggregator;
pub mod types;

#[cfg(test)]
mod tests;
