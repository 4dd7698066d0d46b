//! Secondary Index Module
//!
//! Extractor-driven secondary indexes over cache values.
//!
//! ## Core Concepts
//! - **Extractors**: A `ValueExtractor` derives one comparable `AttributeValue` per entry.
//! - **Structure**: Each index keeps a forward map and an inverted `BTreeMap` of postings.
//! - **Maintenance**: Indexes are updated inside the same critical section as the backing
//!   map, so they always agree with the stored entries.

pub mod extractor;
pub mod manager;
