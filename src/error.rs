//! Error types for database directory operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for database directory operations.
pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Errors that can occur while working with a database directory.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The backing store could not be reached
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open database with context
    #[error("Failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// File not found in the namespace
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Operation issued outside its lifecycle phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Lock handle already closed, or its token disappeared
    #[error("Lock instance already released: {0}")]
    LockAlreadyReleased(String),

    /// Read past the declared file length
    #[error("Read out of range on '{name}': offset {offset} + count {count} exceeds length {length}")]
    OutOfRange {
        name: String,
        offset: u64,
        count: u64,
        length: u64,
    },

    /// Staging or stream I/O failure
    #[error("I/O failure: {0}")]
    Io(io::Error),

    /// Metadata could not be rendered as JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Table name that cannot be used as a SQL identifier
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DirectoryError {
    /// Whether this error means the backing store itself failed.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(
            self,
            DirectoryError::StorageUnavailable(_)
                | DirectoryError::Sqlite(_)
                | DirectoryError::DatabaseOpen { .. }
        )
    }

    /// Wrap this error so it can cross a `std::io::Read` boundary.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            DirectoryError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

impl From<io::Error> for DirectoryError {
    fn from(e: io::Error) -> Self {
        if e.get_ref().is_none() {
            return DirectoryError::Io(e);
        }
        let kind = e.kind();
        match e.into_inner() {
            Some(inner) => match inner.downcast::<DirectoryError>() {
                Ok(err) => *err,
                Err(inner) => DirectoryError::Io(io::Error::new(kind, inner)),
            },
            None => DirectoryError::Io(kind.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_round_trip_keeps_variant() {
        let original = DirectoryError::FileNotFound("_0.cfs".to_string());
        let back: DirectoryError = original.into_io().into();
        assert!(matches!(back, DirectoryError::FileNotFound(name) if name == "_0.cfs"));
    }

    #[test]
    fn test_plain_io_error_becomes_io() {
        let e = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let back: DirectoryError = e.into();
        assert!(matches!(back, DirectoryError::Io(ref inner) if inner.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_json_error_converts() {
        let e = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: DirectoryError = e.into();
        assert!(matches!(err, DirectoryError::Json(_)));
        assert!(!err.is_storage_unavailable());
    }

    #[test]
    fn test_storage_unavailable_grouping() {
        assert!(DirectoryError::StorageUnavailable("down".into()).is_storage_unavailable());
        assert!(DirectoryError::Sqlite(rusqlite::Error::InvalidQuery).is_storage_unavailable());
        assert!(!DirectoryError::FileNotFound("x".into()).is_storage_unavailable());
        assert!(!DirectoryError::InvalidState("x".into()).is_storage_unavailable());
    }
}
