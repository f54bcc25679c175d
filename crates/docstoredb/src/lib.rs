//! # docstoredb
//!
//! Embedded schema-less document-table engine.
//!
//! A [`Table`] presents a named collection of JSON-object documents,
//! each identified by an integer ID, on top of a [`Storage`] backend
//! that only knows how to read and write one whole snapshot. Mutations
//! run a read-transform-write cycle over the full snapshot; repeated
//! predicate searches are served from a per-table LRU query cache
//! keyed by query identity.
//!
//! ```
//! use std::sync::Arc;
//! use docstoredb::{MemoryStorage, Query, Table};
//! use serde_json::json;
//!
//! let table = Table::new(Arc::new(MemoryStorage::new()), "users");
//! table.insert(json!({"name": "Alice", "age": 30})).unwrap();
//!
//! let adults = Query::new("adult", json!(18), |doc| {
//!     doc.get("age").and_then(|v| v.as_u64()).map_or(false, |age| age >= 18)
//! });
//! assert_eq!(table.search(&adults).unwrap().len(), 1);
//! ```

#![warn(missing_docs)]

mod document;
mod error;
mod query;
mod storage;
mod table;

pub use document::{Document, DocumentContent, DocumentId, TableData};
pub use error::{Error, Result};
pub use query::{freeze, FrozenValue, Query};
pub use storage::{JsonStorage, MemoryStorage, Snapshot, Storage};
pub use table::{Found, NewDocument, Table, UpdateOp, DEFAULT_QUERY_CACHE_CAPACITY};
