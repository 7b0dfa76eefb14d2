//! Error types for the storage layer.

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// Path or archive already occupied and overwrite was not requested.
    Duplicate(String),
    /// Referenced entry, path, or archive is absent.
    NotFound(String),
    /// Path contains a rejected segment (`..`) or is otherwise unusable.
    InvalidPath(String),
    /// Persisted document could not be decoded.
    Corrupt(String),
    /// Filesystem operation failed.
    Io(String),
    /// Invariant violation; opaque to clients.
    Internal(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate(what) => write!(f, "already exists: {}", what),
            Self::NotFound(what) => write!(f, "not found: {}", what),
            Self::InvalidPath(path) => write!(f, "invalid path: {}", path),
            Self::Corrupt(what) => write!(f, "corrupt document: {}", what),
            Self::Io(msg) => write!(f, "storage io: {}", msg),
            Self::Internal(msg) => write!(f, "internal storage error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<zip::result::ZipError> for StoreError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Io(e.to_string())
    }
}
