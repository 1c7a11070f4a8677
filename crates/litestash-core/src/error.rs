//! Store error handling
//!
//! Provides typed errors for repository operations with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during repository operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database file could not be opened, is locked, or is not a database
    ///
    /// Also covers failing to create the directory that holds the file.
    #[error("Failed to open database '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: OpenError,
    },

    /// The handle was closed before this operation
    #[error("Repository handle is closed")]
    Closed,

    /// A value could not be encoded for storage
    #[error("Failed to serialize '{id}' for table '{table}': {source}")]
    Serialization {
        table: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A signal carries a value that cannot be stored faithfully
    #[error("Invalid signal '{id}': {reason}")]
    InvalidSignal { id: String, reason: String },

    /// A stored payload does not match the requested shape
    #[error("Failed to deserialize '{id}' from table '{table}': {source}")]
    Deserialization {
        table: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A batch failed and its writes were rolled back
    #[error("Transaction rolled back: {source}")]
    Transaction {
        #[source]
        source: Box<StoreError>,
    },

    /// A transaction is already open on this handle
    #[error("A transaction is already active on this handle")]
    NestedTransaction,

    /// The caller aborted a batch
    #[error("Batch aborted: {reason}")]
    Aborted { reason: String },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A background task running a blocking operation failed
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Underlying cause of a `StoreError::Io`
#[derive(Error, Debug)]
pub enum OpenError {
    /// SQLite refused the file
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// The parent directory could not be created
    #[error("could not create directory: {0}")]
    Filesystem(#[from] io::Error),
}

impl StoreError {
    /// Create an abort error, for failing a transaction batch on purpose
    pub fn aborted(reason: impl Into<String>) -> Self {
        StoreError::Aborted {
            reason: reason.into(),
        }
    }

    /// Wrap an error raised while opening or configuring the file at `path`
    pub fn from_open(error: impl Into<OpenError>, path: PathBuf) -> Self {
        StoreError::Io {
            path,
            source: error.into(),
        }
    }

    /// Unwrap a transaction error to the failure that caused the rollback
    ///
    /// Other errors are returned as-is.
    pub fn into_cause(self) -> StoreError {
        match self {
            StoreError::Transaction { source } => *source,
            other => other,
        }
    }

    /// Check if the underlying engine reported the database as busy or locked
    pub fn is_locked(&self) -> bool {
        matches!(
            self.sqlite_code(),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        if self.is_locked() {
            return Some("Another process holds a lock on the database. Retry later or raise busy_timeout_ms.");
        }
        match self {
            StoreError::Io {
                source: OpenError::Sqlite(source),
                ..
            } => match sqlite_code(source) {
                Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) => {
                    Some("The file is not a valid SQLite database. Restore it from a backup or point db_path elsewhere.")
                }
                Some(ErrorCode::CannotOpen | ErrorCode::PermissionDenied | ErrorCode::ReadOnly) => {
                    Some("Check that the database path exists and is writable.")
                }
                _ => None,
            },
            StoreError::Io {
                source: OpenError::Filesystem(_),
                ..
            } => Some("Check that the parent directory exists and you have write permissions."),
            StoreError::Closed => Some("Open a new repository handle."),
            StoreError::NestedTransaction => {
                Some("Run the operations inside the existing batch instead of opening a new one.")
            }
            _ => None,
        }
    }

    fn sqlite_code(&self) -> Option<ErrorCode> {
        match self {
            StoreError::Io {
                source: OpenError::Sqlite(source),
                ..
            }
            | StoreError::Database(source) => sqlite_code(source),
            StoreError::Transaction { source } => source.sqlite_code(),
            _ => None,
        }
    }
}

fn sqlite_code(error: &rusqlite::Error) -> Option<ErrorCode> {
    match error {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.code),
        _ => None,
    }
}

/// Result type for repository operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_locked_classification() {
        let err = StoreError::Database(sqlite_failure(rusqlite::ffi::SQLITE_BUSY));
        assert!(err.is_locked());
        assert!(err.recovery_suggestion().unwrap().contains("busy_timeout_ms"));
    }

    #[test]
    fn test_not_a_database_suggestion() {
        let err = StoreError::from_open(
            sqlite_failure(rusqlite::ffi::SQLITE_NOTADB),
            PathBuf::from("/data/garbage.db"),
        );
        assert!(!err.is_locked());
        assert!(err.recovery_suggestion().unwrap().contains("not a valid SQLite"));
        assert!(err.to_string().contains("/data/garbage.db"));
    }

    #[test]
    fn test_directory_failure_is_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = StoreError::from_open(io_err, PathBuf::from("/readonly/store.db"));

        assert!(matches!(
            err,
            StoreError::Io {
                source: OpenError::Filesystem(_),
                ..
            }
        ));
        assert!(err.recovery_suggestion().unwrap().contains("write permissions"));
        assert!(err.to_string().contains("/readonly/store.db"));
    }

    #[test]
    fn test_transaction_keeps_cause() {
        let err = StoreError::Transaction {
            source: Box::new(StoreError::aborted("boom")),
        };

        assert!(err.to_string().contains("rolled back"));
        assert!(err.source().unwrap().to_string().contains("boom"));
        assert!(matches!(err.into_cause(), StoreError::Aborted { reason } if reason == "boom"));
    }

    #[test]
    fn test_into_cause_passthrough() {
        assert!(matches!(StoreError::Closed.into_cause(), StoreError::Closed));
    }

    #[test]
    fn test_locked_inside_transaction() {
        let err = StoreError::Transaction {
            source: Box::new(StoreError::Database(sqlite_failure(
                rusqlite::ffi::SQLITE_LOCKED,
            ))),
        };
        assert!(err.is_locked());
    }
}
