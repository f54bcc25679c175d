//! Document data model
//!
//! A document is an identified, ordered, string-keyed mapping of
//! arbitrary JSON values. Two documents are distinguished by ID even
//! when their content is identical; within one table snapshot the ID
//! is unique.

use std::collections::BTreeMap;
use std::ops::Deref;

use serde_json::{Map, Value};

/// Document identifier
pub type DocumentId = u64;

/// Ordered string-keyed document content
pub type DocumentContent = Map<String, Value>;

/// One table's documents, keyed by ID
pub type TableData = BTreeMap<DocumentId, DocumentContent>;

/// A document stored in a table, pairing content with its ID.
///
/// Dereferences to its content, so field access reads like a plain
/// mapping: `doc.get("name")`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: DocumentId,
    content: DocumentContent,
}

impl Document {
    /// Create a document from an ID and content
    pub fn new(id: DocumentId, content: DocumentContent) -> Self {
        Self { id, content }
    }

    /// Get the document ID
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Get the document content
    pub fn content(&self) -> &DocumentContent {
        &self.content
    }

    /// Split the document into its ID and content
    pub fn into_parts(self) -> (DocumentId, DocumentContent) {
        (self.id, self.content)
    }
}

impl Deref for Document {
    type Target = DocumentContent;

    fn deref(&self) -> &DocumentContent {
        &self.content
    }
}
