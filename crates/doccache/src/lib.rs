//! # doccache
//!
//! Access-ordered LRU container used as the docstoredb query cache.
//!
//! ## Architecture
//! - **HashMap**: AHash for fast lookups (O(1))
//! - **LRU List**: Doubly-linked list over a slab for eviction (O(1))
//! - **Recency contract**: `get` promotes, `contains_key` does not
//!
//! Capacity is optional: a bounded cache evicts exactly one
//! least-recently-used entry per overflowing insert, an unbounded
//! cache never evicts.

#![warn(missing_docs)]

mod error;
mod lru;
mod stats;

pub use error::{Error, Result};
pub use lru::{Keys, LruCache};
pub use stats::CacheStats;
