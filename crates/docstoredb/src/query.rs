//! Query predicates with stable identity
//!
//! The table's query cache is keyed by query identity, so a predicate
//! must be hashable and comparable. [`Query`] pairs an opaque matcher
//! closure with a label and a frozen parameter value; equality and
//! hashing derive from the label and parameters only. Two queries
//! built with the same label and structurally equal parameters are the
//! same cache key, whatever their closures are.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::Value;

use crate::document::DocumentContent;

/// A predicate over document content, usable as a cache key.
///
/// The closure is consulted only by [`matches`](Self::matches); cache
/// identity is `(label, params)`. Callers are responsible for giving
/// distinct queries distinct labels or parameters.
#[derive(Clone)]
pub struct Query {
    label: String,
    params: FrozenValue,
    predicate: Arc<dyn Fn(&DocumentContent) -> bool + Send + Sync>,
}

impl Query {
    /// Create a query from a label, a parameter value and a matcher
    pub fn new<F>(label: impl Into<String>, params: Value, predicate: F) -> Self
    where
        F: Fn(&DocumentContent) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            params: freeze(&params),
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluate the predicate against document content
    pub fn matches(&self, content: &DocumentContent) -> bool {
        (self.predicate)(content)
    }

    /// Get the query label
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && self.params == other.params
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.label.hash(state);
        self.params.hash(state);
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("label", &self.label)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// An immutable, hashable rendition of a JSON value.
///
/// Maps are stored as key-sorted entry lists so that structurally
/// equal objects hash equal regardless of insertion order. Floats are
/// hashed by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrozenValue {
    /// JSON null
    Null,
    /// JSON boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer outside the i64 range
    UInt(u64),
    /// Float, stored as its IEEE 754 bit pattern
    Float(u64),
    /// String
    Str(String),
    /// Array
    Seq(Vec<FrozenValue>),
    /// Object, as key-sorted entries
    Map(Vec<(String, FrozenValue)>),
}

/// Freeze a JSON value into an immutable, hashable structure
pub fn freeze(value: &Value) -> FrozenValue {
    match value {
        Value::Null => FrozenValue::Null,
        Value::Bool(b) => FrozenValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FrozenValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                FrozenValue::UInt(u)
            } else {
                FrozenValue::Float(n.as_f64().unwrap_or(f64::NAN).to_bits())
            }
        }
        Value::String(s) => FrozenValue::Str(s.clone()),
        Value::Array(items) => FrozenValue::Seq(items.iter().map(freeze).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(String, FrozenValue)> = map
                .iter()
                .map(|(k, v)| (k.clone(), freeze(v)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            FrozenValue::Map(entries)
        }
    }
}
