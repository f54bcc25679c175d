//! Document tables
//!
//! A [`Table`] mediates all document access against a whole-snapshot
//! storage backend. Reads always pull a fresh snapshot; writes run a
//! fixed protocol: read the full snapshot, transform this table's data
//! in memory, write the full snapshot back, and discard the query
//! cache. The cache holds materialized search results keyed by query
//! identity and is cleared wholesale on every mutation, since any
//! write can change any result set.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use doccache::{CacheStats, LruCache};

use crate::document::{Document, DocumentContent, DocumentId, TableData};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::storage::{Snapshot, Storage};

/// Default capacity of the per-table query cache
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 10;

/// A document on its way into a table.
///
/// Plain content gets a freshly allocated ID; a [`Document`] (usually
/// from a read-then-reinsert round trip) keeps its existing ID, and
/// inserting it over an occupied ID is an error.
pub enum NewDocument {
    /// Content only; must be a JSON object. The table allocates the ID.
    Content(serde_json::Value),
    /// A document carrying an explicit ID
    Document(Document),
}

impl From<serde_json::Value> for NewDocument {
    fn from(value: serde_json::Value) -> Self {
        NewDocument::Content(value)
    }
}

impl From<DocumentContent> for NewDocument {
    fn from(content: DocumentContent) -> Self {
        NewDocument::Content(serde_json::Value::Object(content))
    }
}

impl From<Document> for NewDocument {
    fn from(document: Document) -> Self {
        NewDocument::Document(document)
    }
}

/// How `update` changes a selected document's content
pub enum UpdateOp {
    /// Shallow-merge these fields into the document
    Merge(DocumentContent),
    /// Transform the document content in place
    Transform(Arc<dyn Fn(&mut DocumentContent) + Send + Sync>),
}

impl UpdateOp {
    /// Create a transforming update from a closure
    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(&mut DocumentContent) + Send + Sync + 'static,
    {
        UpdateOp::Transform(Arc::new(f))
    }

    fn apply(&self, content: &mut DocumentContent) {
        match self {
            UpdateOp::Merge(fields) => {
                for (key, value) in fields {
                    content.insert(key.clone(), value.clone());
                }
            }
            UpdateOp::Transform(f) => f(content),
        }
    }
}

impl From<DocumentContent> for UpdateOp {
    fn from(fields: DocumentContent) -> Self {
        UpdateOp::Merge(fields)
    }
}

impl fmt::Debug for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOp::Merge(fields) => f.debug_tuple("Merge").field(fields).finish(),
            UpdateOp::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// Result of a [`Table::get`] lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Found {
    /// A single document (predicate or single-ID lookup)
    One(Document),
    /// All documents found for an ID list
    Many(Vec<Document>),
}

impl Found {
    /// Flatten into a document list
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Found::One(doc) => vec![doc],
            Found::Many(docs) => docs,
        }
    }
}

/// A named collection of documents inside a storage snapshot.
///
/// The table owns two pieces of private, in-memory state: the lazily
/// computed ID cursor and the LRU query cache. Neither is shared
/// between table instances, even ones pointing at the same storage.
pub struct Table {
    storage: Arc<dyn Storage>,
    name: String,
    query_cache: RwLock<LruCache<Query, Vec<Document>>>,
    next_id: Mutex<Option<DocumentId>>,
    stats: CacheStats,
}

impl Table {
    /// Create a table over the given storage with the default query
    /// cache capacity
    pub fn new(storage: Arc<dyn Storage>, name: impl Into<String>) -> Self {
        Self::with_cache_capacity(storage, name, Some(DEFAULT_QUERY_CACHE_CAPACITY))
    }

    /// Create a table with an explicit query cache capacity
    /// (`None` = unbounded)
    pub fn with_cache_capacity(
        storage: Arc<dyn Storage>,
        name: impl Into<String>,
        capacity: Option<usize>,
    ) -> Self {
        let cache = match capacity {
            Some(cap) => LruCache::bounded(cap),
            None => LruCache::unbounded(),
        };

        Self {
            storage,
            name: name.into(),
            query_cache: RwLock::new(cache),
            next_id: Mutex::new(None),
            stats: CacheStats::new(),
        }
    }

    /// Get the table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get query cache statistics
    pub fn cache_stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Insert a new document.
    ///
    /// Plain content receives a fresh ID; if the allocated ID turns out
    /// to be taken at write time (the cursor can go stale when another
    /// handle writes the same storage), the next free ID is assigned
    /// silently. A [`Document`] keeps its explicit ID, and a collision
    /// is an [`Error::DuplicateId`].
    ///
    /// # Returns
    /// * The final assigned document ID
    pub fn insert(&self, document: impl Into<NewDocument>) -> Result<DocumentId> {
        let assigned = match document.into() {
            NewDocument::Content(value) => {
                let content = object_content(value)?;
                let seed = self.next_id()?;
                self.update_table(|data| {
                    let mut doc_id = seed;
                    while data.contains_key(&doc_id) {
                        doc_id = self.next_id()?;
                        debug!(table = %self.name, doc_id, "allocated ID taken, reassigned");
                    }
                    data.insert(doc_id, content);
                    Ok(doc_id)
                })?
            }
            NewDocument::Document(doc) => self.update_table(|data| {
                let (id, content) = doc.into_parts();
                if data.contains_key(&id) {
                    return Err(Error::DuplicateId(id));
                }
                data.insert(id, content);
                Ok(id)
            })?,
        };

        self.invalidate_cache();
        Ok(assigned)
    }

    /// Insert multiple documents as one batch.
    ///
    /// Validation happens before any mutation: a single malformed
    /// document fails the whole batch and storage is left untouched.
    /// Per-document ID rules are the same as for [`insert`](Self::insert).
    ///
    /// # Returns
    /// * Final assigned IDs, in input order
    pub fn insert_multiple<I>(&self, documents: I) -> Result<Vec<DocumentId>>
    where
        I: IntoIterator<Item = NewDocument>,
    {
        let mut staged: Vec<(Option<DocumentId>, DocumentContent)> = Vec::new();
        for document in documents {
            match document {
                NewDocument::Content(value) => staged.push((None, object_content(value)?)),
                NewDocument::Document(doc) => {
                    let (id, content) = doc.into_parts();
                    staged.push((Some(id), content));
                }
            }
        }

        let mut entries: Vec<(bool, DocumentId, DocumentContent)> =
            Vec::with_capacity(staged.len());
        for (explicit_id, content) in staged {
            match explicit_id {
                Some(id) => entries.push((true, id, content)),
                None => {
                    let id = self.next_id()?;
                    entries.push((false, id, content));
                }
            }
        }

        let assigned = self.update_table(|data| {
            let mut final_ids = Vec::with_capacity(entries.len());
            for (explicit, mut doc_id, content) in entries {
                if data.contains_key(&doc_id) {
                    if explicit {
                        return Err(Error::DuplicateId(doc_id));
                    }
                    while data.contains_key(&doc_id) {
                        doc_id = self.next_id()?;
                    }
                }
                data.insert(doc_id, content);
                final_ids.push(doc_id);
            }
            Ok(final_ids)
        })?;

        self.invalidate_cache();
        Ok(assigned)
    }

    /// Get all documents, freshly read from storage
    pub fn all(&self) -> Result<Vec<Document>> {
        let data = self.read_table()?;
        Ok(data
            .into_iter()
            .map(|(id, content)| Document::new(id, content))
            .collect())
    }

    /// Iterate over all documents in ID order
    pub fn iter(&self) -> Result<std::vec::IntoIter<Document>> {
        Ok(self.all()?.into_iter())
    }

    /// Search for all documents matching a query.
    ///
    /// Results are cached by query identity; a hit returns the
    /// materialized list without touching storage or re-evaluating the
    /// predicate. Any mutation clears the cache.
    pub fn search(&self, cond: &Query) -> Result<Vec<Document>> {
        {
            let mut cache = self.query_cache.write();
            if let Some(docs) = cache.get_opt(cond) {
                trace!(table = %self.name, query = cond.label(), "query cache hit");
                self.stats.record_hit();
                return Ok(docs.clone());
            }
        }

        trace!(table = %self.name, query = cond.label(), "query cache miss");
        self.stats.record_miss();

        let docs: Vec<Document> = self
            .all()?
            .into_iter()
            .filter(|doc| cond.matches(doc.content()))
            .collect();

        let mut cache = self.query_cache.write();
        if cache.set(cond.clone(), docs.clone()).is_some() {
            self.stats.record_eviction();
        }

        Ok(docs)
    }

    /// Count the documents matching a query
    pub fn count(&self, cond: &Query) -> Result<usize> {
        Ok(self.search(cond)?.len())
    }

    /// Get documents by query, single ID or ID list.
    ///
    /// The modes are mutually exclusive; `doc_id` wins over `doc_ids`,
    /// which wins over `cond`. ID lookups go straight to the snapshot
    /// and bypass the query cache. A predicate lookup returns the first
    /// match; an ID-list lookup returns every document found, or `None`
    /// when nothing matched.
    ///
    /// # Returns
    /// * `Err(Error::MissingCriteria)` when no criterion is given
    pub fn get(
        &self,
        cond: Option<&Query>,
        doc_id: Option<DocumentId>,
        doc_ids: Option<&[DocumentId]>,
    ) -> Result<Option<Found>> {
        if let Some(id) = doc_id {
            let data = self.read_table()?;
            return Ok(data
                .get(&id)
                .map(|content| Found::One(Document::new(id, content.clone()))));
        }

        if let Some(ids) = doc_ids {
            let data = self.read_table()?;
            let docs: Vec<Document> = ids
                .iter()
                .filter_map(|id| data.get(id).map(|content| Document::new(*id, content.clone())))
                .collect();
            return Ok(if docs.is_empty() {
                None
            } else {
                Some(Found::Many(docs))
            });
        }

        if let Some(cond) = cond {
            let docs = self.search(cond)?;
            return Ok(docs.into_iter().next().map(Found::One));
        }

        Err(Error::MissingCriteria("get documents"))
    }

    /// Check whether the table contains a matching document.
    ///
    /// An ID check reads the snapshot directly; a predicate check
    /// delegates to [`get`](Self::get).
    pub fn contains(&self, cond: Option<&Query>, doc_id: Option<DocumentId>) -> Result<bool> {
        if let Some(id) = doc_id {
            return Ok(self.read_table()?.contains_key(&id));
        }

        if let Some(cond) = cond {
            return Ok(self.get(Some(cond), None, None)?.is_some());
        }

        Err(Error::MissingCriteria("check for documents"))
    }

    /// Update matching documents.
    ///
    /// `doc_ids` takes precedence over `cond`; with neither, every
    /// document is updated. IDs that don't exist are silently skipped.
    ///
    /// # Returns
    /// * IDs of the documents that were actually updated
    pub fn update(
        &self,
        op: UpdateOp,
        cond: Option<&Query>,
        doc_ids: Option<&[DocumentId]>,
    ) -> Result<Vec<DocumentId>> {
        let updated = self.update_table(|data| {
            let mut updated = Vec::new();

            if let Some(ids) = doc_ids {
                for &id in ids {
                    if let Some(content) = data.get_mut(&id) {
                        op.apply(content);
                        updated.push(id);
                    }
                }
            } else {
                for (&id, content) in data.iter_mut() {
                    if cond.map_or(true, |q| q.matches(content)) {
                        op.apply(content);
                        updated.push(id);
                    }
                }
            }

            Ok(updated)
        })?;

        self.invalidate_cache();
        Ok(updated)
    }

    /// Apply a sequence of `(operation, query)` updates in order.
    ///
    /// Each pair runs as an independent update with its own full
    /// read-transform-write cycle.
    ///
    /// # Returns
    /// * Concatenated updated-ID lists
    pub fn update_multiple(&self, updates: Vec<(UpdateOp, Query)>) -> Result<Vec<DocumentId>> {
        let mut updated = Vec::new();
        for (op, cond) in updates {
            updated.extend(self.update(op, Some(&cond), None)?);
        }
        Ok(updated)
    }

    /// Update documents if they exist, insert otherwise.
    ///
    /// A [`Document`] with an explicit ID updates that ID or inserts
    /// under it. Plain content requires a query; all matches are
    /// updated, and with zero matches the content is inserted under a
    /// fresh ID.
    ///
    /// # Returns
    /// * Updated document IDs, or the single inserted ID
    pub fn upsert(
        &self,
        document: impl Into<NewDocument>,
        cond: Option<&Query>,
    ) -> Result<Vec<DocumentId>> {
        match document.into() {
            NewDocument::Document(doc) => {
                let updated =
                    self.update(UpdateOp::Merge(doc.content().clone()), None, Some(&[doc.id()]))?;
                if !updated.is_empty() {
                    return Ok(updated);
                }
                Ok(vec![self.insert(doc)?])
            }
            NewDocument::Content(value) => {
                let cond =
                    cond.ok_or(Error::MissingCriteria("upsert a document without an ID"))?;
                let content = object_content(value)?;
                let updated = self.update(UpdateOp::Merge(content.clone()), Some(cond), None)?;
                if !updated.is_empty() {
                    return Ok(updated);
                }
                Ok(vec![self.insert(serde_json::Value::Object(content))?])
            }
        }
    }

    /// Remove matching documents.
    ///
    /// At least one criterion is required; `doc_ids` takes precedence.
    /// IDs that don't exist are silently skipped.
    ///
    /// # Returns
    /// * IDs of the removed documents
    pub fn remove(
        &self,
        cond: Option<&Query>,
        doc_ids: Option<&[DocumentId]>,
    ) -> Result<Vec<DocumentId>> {
        if cond.is_none() && doc_ids.is_none() {
            return Err(Error::MissingCriteria("remove documents"));
        }

        let removed = self.update_table(|data| {
            let mut removed = Vec::new();

            if let Some(ids) = doc_ids {
                for &id in ids {
                    if data.remove(&id).is_some() {
                        removed.push(id);
                    }
                }
            } else if let Some(cond) = cond {
                let matching: Vec<DocumentId> = data
                    .iter()
                    .filter(|(_, content)| cond.matches(content))
                    .map(|(&id, _)| id)
                    .collect();
                for id in matching {
                    data.remove(&id);
                    removed.push(id);
                }
            }

            Ok(removed)
        })?;

        self.invalidate_cache();
        Ok(removed)
    }

    /// Remove every document and forget the ID cursor.
    ///
    /// The next allocation recomputes from the (now empty) table and
    /// yields ID 1.
    pub fn truncate(&self) -> Result<()> {
        self.update_table(|data| {
            data.clear();
            Ok(())
        })?;

        self.invalidate_cache();
        *self.next_id.lock() = None;
        debug!(table = %self.name, "table truncated");
        Ok(())
    }

    /// Count all documents in the table
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_table()?.len())
    }

    /// Check whether the table holds no documents
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Manually clear the query cache
    pub fn clear_cache(&self) {
        self.invalidate_cache();
    }

    /// Allocate the next document ID.
    ///
    /// The cursor is computed once from a fresh snapshot (`max + 1`,
    /// or 1 for an empty table) and then advanced in memory without
    /// consulting storage again, until truncate resets it.
    fn next_id(&self) -> Result<DocumentId> {
        let mut cursor = self.next_id.lock();

        if let Some(current) = *cursor {
            let next = current + 1;
            *cursor = Some(next);
            return Ok(next);
        }

        let data = self.read_table()?;
        let next = data.keys().next_back().map_or(1, |max| max + 1);
        *cursor = Some(next);
        Ok(next)
    }

    /// Read this table's data from a fresh storage snapshot.
    ///
    /// A missing snapshot or table reads as empty.
    fn read_table(&self) -> Result<TableData> {
        let snapshot = self.storage.read()?.unwrap_or_default();
        Ok(snapshot.get(&self.name).cloned().unwrap_or_default())
    }

    /// Run one update-protocol cycle: read the full snapshot, let the
    /// updater transform this table's data, write the full snapshot
    /// back. A failing updater writes nothing.
    fn update_table<R>(&self, updater: impl FnOnce(&mut TableData) -> Result<R>) -> Result<R> {
        let mut snapshot: Snapshot = self.storage.read()?.unwrap_or_default();
        let data = snapshot.entry(self.name.clone()).or_default();
        let result = updater(data)?;
        self.storage.write(&snapshot)?;
        Ok(result)
    }

    fn invalidate_cache(&self) {
        trace!(table = %self.name, "query cache cleared");
        self.query_cache.write().clear();
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn object_content(value: serde_json::Value) -> Result<DocumentContent> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::InvalidInput(format!(
            "document is not an object: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table() -> Table {
        Table::new(Arc::new(MemoryStorage::new()), "test")
    }

    fn fields(value: Value) -> DocumentContent {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn by_field(key: &str, value: Value) -> Query {
        let k = key.to_string();
        let v = value.clone();
        let mut params = serde_json::Map::new();
        params.insert(key.to_string(), value);
        Query::new(format!("{}_eq", key), Value::Object(params), move |doc| {
            doc.get(&k) == Some(&v)
        })
    }

    fn counting_query(calls: Arc<AtomicUsize>) -> Query {
        Query::new("has_x", json!(null), move |doc| {
            calls.fetch_add(1, Ordering::SeqCst);
            doc.contains_key("x")
        })
    }

    #[test]
    fn test_insert_returns_increasing_ids() {
        let table = table();

        let a = table.insert(json!({"x": 1})).unwrap();
        let b = table.insert(json!({"x": 2})).unwrap();
        let c = table.insert(json!({"x": 3})).unwrap();

        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(table.len().unwrap(), 3);
    }

    #[test]
    fn test_insert_rejects_non_object() {
        let table = table();

        let err = table.insert(json!(42)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(table.len().unwrap(), 0);
    }

    #[test]
    fn test_insert_explicit_id() {
        let table = table();

        let id = table
            .insert(Document::new(5, fields(json!({"x": 1}))))
            .unwrap();

        assert_eq!(id, 5);
        // Subsequent auto allocation continues past the explicit ID
        assert_eq!(table.insert(json!({"x": 2})).unwrap(), 6);
    }

    #[test]
    fn test_insert_duplicate_explicit_id_errors() {
        let table = table();
        table.insert(json!({"x": 1})).unwrap();

        let err = table
            .insert(Document::new(1, fields(json!({"x": 2}))))
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateId(1)));
        assert_eq!(table.len().unwrap(), 1);
        // The original content is untouched
        let found = table.get(None, Some(1), None).unwrap().unwrap();
        assert_eq!(found, Found::One(Document::new(1, fields(json!({"x": 1})))));
    }

    #[test]
    fn test_insert_auto_id_reassigned_on_stale_cursor() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let ours = Table::new(storage.clone(), "test");
        let theirs = Table::new(storage, "test");

        assert_eq!(ours.insert(json!({"x": 1})).unwrap(), 1);
        // Another handle claims ID 2 behind our back
        theirs
            .insert(Document::new(2, fields(json!({"x": 2}))))
            .unwrap();

        // Our cursor would hand out 2; the collision is resolved silently
        let id = ours.insert(json!({"x": 3})).unwrap();
        assert_eq!(id, 3);
        assert_eq!(ours.len().unwrap(), 3);
    }

    #[test]
    fn test_insert_multiple_ids_in_input_order() {
        let table = table();

        let ids = table
            .insert_multiple(vec![
                NewDocument::from(json!({"x": 1})),
                NewDocument::from(Document::new(10, fields(json!({"x": 2})))),
                NewDocument::from(json!({"x": 3})),
            ])
            .unwrap();

        assert_eq!(ids, vec![1, 10, 2]);
    }

    #[test]
    fn test_insert_multiple_validates_before_mutating() {
        let table = table();

        let err = table
            .insert_multiple(vec![
                NewDocument::from(json!({"x": 1})),
                NewDocument::from(json!("not an object")),
            ])
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(table.len().unwrap(), 0);
    }

    #[test]
    fn test_insert_multiple_duplicate_id_aborts_batch() {
        let table = table();
        table.insert(json!({"x": 1})).unwrap();

        let err = table
            .insert_multiple(vec![
                NewDocument::from(json!({"x": 2})),
                NewDocument::from(Document::new(1, fields(json!({"x": 3})))),
            ])
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateId(1)));
        // The batch's valid element was not applied either
        assert_eq!(table.len().unwrap(), 1);
    }

    #[test]
    fn test_search_caches_results() {
        let table = table();
        table.insert(json!({"x": 1})).unwrap();
        table.insert(json!({"y": 2})).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let q = counting_query(calls.clone());

        let first = table.search(&q).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Second search is served from the cache
        let second = table.search(&q).unwrap();
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(table.cache_stats().hits(), 1);

        // Any mutation invalidates; the third search recomputes
        table.insert(json!({"x": 3})).unwrap();
        let third = table.search(&q).unwrap();
        assert_eq!(third.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_search_cache_keyed_by_identity() {
        let table = table();
        table.insert(json!({"x": 1})).unwrap();

        let q1 = Query::new("has_x", json!(null), |doc| doc.contains_key("x"));
        // Same identity, different closure: the cache answers for it
        let q2 = Query::new("has_x", json!(null), |_| false);

        let first = table.search(&q1).unwrap();
        let second = table.search(&q2).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_search_cache_eviction_tracked() {
        let storage = Arc::new(MemoryStorage::new());
        let table = Table::with_cache_capacity(storage, "test", Some(1));
        table.insert(json!({"x": 1})).unwrap();

        table.search(&by_field("x", json!(1))).unwrap();
        table.search(&by_field("x", json!(2))).unwrap(); // evicts the first entry

        assert_eq!(table.cache_stats().evictions(), 1);

        // The first query is a miss again
        table.search(&by_field("x", json!(1))).unwrap();
        assert_eq!(table.cache_stats().misses(), 3);
        assert_eq!(table.cache_stats().hits(), 0);
    }

    #[test]
    fn test_clear_cache_forces_recompute() {
        let table = table();
        table.insert(json!({"x": 1})).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let q = counting_query(calls.clone());

        table.search(&q).unwrap();
        table.clear_cache();
        table.search(&q).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_all_rereads_storage() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let ours = Table::new(storage.clone(), "test");
        let theirs = Table::new(storage, "test");

        assert!(ours.all().unwrap().is_empty());
        theirs.insert(json!({"x": 1})).unwrap();

        // No caching on the all() path
        assert_eq!(ours.all().unwrap().len(), 1);
    }

    #[test]
    fn test_get_by_id() {
        let table = table();
        let id = table.insert(json!({"x": 1})).unwrap();

        let found = table.get(None, Some(id), None).unwrap().unwrap();
        assert_eq!(found, Found::One(Document::new(id, fields(json!({"x": 1})))));

        assert!(table.get(None, Some(999), None).unwrap().is_none());
    }

    #[test]
    fn test_get_by_ids() {
        let table = table();
        let a = table.insert(json!({"x": 1})).unwrap();
        let b = table.insert(json!({"x": 2})).unwrap();

        let found = table.get(None, None, Some(&[a, 999, b])).unwrap().unwrap();
        assert_eq!(found.into_documents().len(), 2);

        // Zero matches read as absence
        assert!(table.get(None, None, Some(&[998, 999])).unwrap().is_none());
        assert!(table.get(None, None, Some(&[])).unwrap().is_none());
    }

    #[test]
    fn test_get_by_query_returns_first_match() {
        let table = table();
        table.insert(json!({"x": 1, "n": "a"})).unwrap();
        table.insert(json!({"x": 1, "n": "b"})).unwrap();

        let found = table
            .get(Some(&by_field("x", json!(1))), None, None)
            .unwrap()
            .unwrap();

        match found {
            Found::One(doc) => assert_eq!(doc.get("n"), Some(&json!("a"))),
            other => panic!("expected a single document, got {:?}", other),
        }
    }

    #[test]
    fn test_get_without_criteria_errors() {
        let table = table();
        let err = table.get(None, None, None).unwrap_err();
        assert!(matches!(err, Error::MissingCriteria(_)));
    }

    #[test]
    fn test_contains() {
        let table = table();
        let id = table.insert(json!({"x": 1})).unwrap();

        assert!(table.contains(None, Some(id)).unwrap());
        assert!(!table.contains(None, Some(999)).unwrap());
        assert!(table.contains(Some(&by_field("x", json!(1))), None).unwrap());
        assert!(!table.contains(Some(&by_field("x", json!(2))), None).unwrap());

        let err = table.contains(None, None).unwrap_err();
        assert!(matches!(err, Error::MissingCriteria(_)));
    }

    #[test]
    fn test_update_merges_fields() {
        let table = table();
        let id = table.insert(json!({"x": 1, "keep": true})).unwrap();

        let updated = table
            .update(
                UpdateOp::Merge(fields(json!({"x": 2}))),
                Some(&by_field("x", json!(1))),
                None,
            )
            .unwrap();

        assert_eq!(updated, vec![id]);
        let found = table.get(None, Some(id), None).unwrap().unwrap();
        assert_eq!(
            found,
            Found::One(Document::new(id, fields(json!({"x": 2, "keep": true}))))
        );
    }

    #[test]
    fn test_update_transform() {
        let table = table();
        let id = table.insert(json!({"count": 1})).unwrap();

        table
            .update(
                UpdateOp::transform(|doc| {
                    let next = doc.get("count").and_then(Value::as_u64).unwrap_or(0) + 1;
                    doc.insert("count".into(), json!(next));
                }),
                None,
                Some(&[id]),
            )
            .unwrap();

        let found = table.get(None, Some(id), None).unwrap().unwrap();
        assert_eq!(found, Found::One(Document::new(id, fields(json!({"count": 2})))));
    }

    #[test]
    fn test_update_missing_ids_skipped() {
        let table = table();

        let updated = table
            .update(UpdateOp::Merge(fields(json!({"x": 2}))), None, Some(&[999]))
            .unwrap();

        assert!(updated.is_empty());
    }

    #[test]
    fn test_update_ids_take_precedence_over_query() {
        let table = table();
        let a = table.insert(json!({"x": 1})).unwrap();
        let b = table.insert(json!({"x": 1})).unwrap();

        let updated = table
            .update(
                UpdateOp::Merge(fields(json!({"seen": true}))),
                Some(&by_field("x", json!(1))),
                Some(&[a]),
            )
            .unwrap();

        assert_eq!(updated, vec![a]);
        let other = table.get(None, Some(b), None).unwrap().unwrap();
        assert_eq!(other, Found::One(Document::new(b, fields(json!({"x": 1})))));
    }

    #[test]
    fn test_update_without_criteria_updates_all() {
        let table = table();
        table.insert(json!({"x": 1})).unwrap();
        table.insert(json!({"x": 2})).unwrap();

        let updated = table
            .update(UpdateOp::Merge(fields(json!({"seen": true}))), None, None)
            .unwrap();

        assert_eq!(updated.len(), 2);
    }

    #[test]
    fn test_update_multiple() {
        let table = table();
        let a = table.insert(json!({"x": 1})).unwrap();
        let b = table.insert(json!({"x": 2})).unwrap();

        let updated = table
            .update_multiple(vec![
                (
                    UpdateOp::Merge(fields(json!({"tag": "one"}))),
                    by_field("x", json!(1)),
                ),
                (
                    UpdateOp::Merge(fields(json!({"tag": "two"}))),
                    by_field("x", json!(2)),
                ),
            ])
            .unwrap();

        assert_eq!(updated, vec![a, b]);
    }

    #[test]
    fn test_upsert_with_explicit_id() {
        let table = table();

        // No document 5 yet: inserted verbatim
        let ids = table
            .upsert(Document::new(5, fields(json!({"x": 1}))), None)
            .unwrap();
        assert_eq!(ids, vec![5]);

        // Second time: updated in place, no duplicate
        let ids = table
            .upsert(Document::new(5, fields(json!({"x": 2}))), None)
            .unwrap();
        assert_eq!(ids, vec![5]);
        assert_eq!(table.len().unwrap(), 1);

        let found = table.get(None, Some(5), None).unwrap().unwrap();
        assert_eq!(found, Found::One(Document::new(5, fields(json!({"x": 2})))));
    }

    #[test]
    fn test_upsert_with_query_falls_back_to_insert() {
        let table = table();

        let ids = table
            .upsert(json!({"x": 1}), Some(&by_field("x", json!(1))))
            .unwrap();
        assert_eq!(ids, vec![1]);

        let ids = table
            .upsert(json!({"x": 1, "seen": true}), Some(&by_field("x", json!(1))))
            .unwrap();
        assert_eq!(ids, vec![1]);
        assert_eq!(table.len().unwrap(), 1);
    }

    #[test]
    fn test_upsert_content_requires_query() {
        let table = table();
        let err = table.upsert(json!({"x": 1}), None).unwrap_err();
        assert!(matches!(err, Error::MissingCriteria(_)));
    }

    #[test]
    fn test_remove_by_query() {
        let table = table();
        let a = table.insert(json!({"x": 1})).unwrap();
        table.insert(json!({"x": 2})).unwrap();

        let removed = table.remove(Some(&by_field("x", json!(1))), None).unwrap();

        assert_eq!(removed, vec![a]);
        assert_eq!(table.len().unwrap(), 1);
    }

    #[test]
    fn test_remove_by_ids_skips_missing() {
        let table = table();
        let a = table.insert(json!({"x": 1})).unwrap();

        let removed = table.remove(None, Some(&[a, 999])).unwrap();

        assert_eq!(removed, vec![a]);
        assert!(table.is_empty().unwrap());
    }

    #[test]
    fn test_remove_without_criteria_errors() {
        let table = table();
        let err = table.remove(None, None).unwrap_err();
        assert!(matches!(err, Error::MissingCriteria(_)));
    }

    #[test]
    fn test_truncate_resets_id_allocation() {
        let table = table();
        table.insert(json!({"x": 1})).unwrap();
        table.insert(json!({"x": 2})).unwrap();

        table.truncate().unwrap();
        assert!(table.is_empty().unwrap());

        assert_eq!(table.insert(json!({"x": 1})).unwrap(), 1);
    }

    #[test]
    fn test_id_allocation_resumes_from_storage() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let first = Table::new(storage.clone(), "test");
        first.insert(json!({"x": 1})).unwrap();
        first.insert(json!({"x": 2})).unwrap();

        // A fresh handle computes its cursor from the snapshot
        let second = Table::new(storage, "test");
        assert_eq!(second.insert(json!({"x": 3})).unwrap(), 3);
    }

    #[test]
    fn test_count_and_iter() {
        let table = table();
        table.insert(json!({"x": 1})).unwrap();
        table.insert(json!({"x": 1})).unwrap();
        table.insert(json!({"y": 2})).unwrap();

        assert_eq!(table.count(&by_field("x", json!(1))).unwrap(), 2);

        let ids: Vec<DocumentId> = table.iter().unwrap().map(|doc| doc.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_tables_share_storage_but_not_names() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let users = Table::new(storage.clone(), "users");
        let posts = Table::new(storage, "posts");

        users.insert(json!({"name": "Alice"})).unwrap();
        posts.insert(json!({"title": "First"})).unwrap();
        posts.insert(json!({"title": "Second"})).unwrap();

        assert_eq!(users.len().unwrap(), 1);
        assert_eq!(posts.len().unwrap(), 2);

        // Truncating one table leaves the other alone
        users.truncate().unwrap();
        assert_eq!(posts.len().unwrap(), 2);
    }
}
