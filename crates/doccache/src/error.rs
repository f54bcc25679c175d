//! Error types for doccache

use std::fmt;

/// Result type alias for doccache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Key not present in the cache
    NotFound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "Key not found"),
        }
    }
}

impl std::error::Error for Error {}
