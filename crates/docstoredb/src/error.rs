//! Error types for docstoredb

use std::fmt;
use std::io;

use crate::document::DocumentId;

/// Result type alias for docstoredb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for table operations
#[derive(Debug)]
pub enum Error {
    /// I/O error from a storage backend
    Io(io::Error),

    /// Snapshot (de)serialization error
    Serde(serde_json::Error),

    /// Document is not a JSON object, or an argument was malformed
    InvalidInput(String),

    /// Explicit document ID collides with an existing document
    DuplicateId(DocumentId),

    /// Operation called without a query or document ID selection
    MissingCriteria(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serde(e) => write!(f, "Snapshot serialization error: {}", e),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::DuplicateId(id) => write!(f, "Document ID {} already exists", id),
            Error::MissingCriteria(op) => {
                write!(f, "Cannot {} without a condition or document ID", op)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}
