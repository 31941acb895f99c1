// Centralized error handling module
// Every failure the uploader can surface, classified by where it happened

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for selection, change detection and transfer.
///
/// Only [`StoreError::NotFound`] during an existence check is ever swallowed;
/// every variant here aborts the current file and stops the batch.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local file could not be opened or read while hashing.
    #[error("I/O error while {operation} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: io::Error,
    },

    /// The origin directory is missing, not a directory, or unreadable.
    #[error("Cannot traverse {}: {reason}", path.display())]
    Traversal { path: PathBuf, reason: String },

    /// Fetching remote metadata failed for a reason other than not-found.
    #[error("Remote metadata lookup failed for {key}: {source}")]
    Remote {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Streaming the file into the store failed.
    #[error("Transfer of {} to {key} failed: {reason}", path.display())]
    Transfer {
        path: PathBuf,
        key: String,
        reason: String,
    },

    /// An allow/disallow glob could not be compiled.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// The configuration is unusable.
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl SyncError {
    /// Create an Io error with context about the operation.
    pub fn io(err: io::Error, operation: &str, path: impl Into<PathBuf>) -> Self {
        SyncError::Io {
            path: path.into(),
            operation: operation.to_string(),
            source: err,
        }
    }

    /// Create a Traversal error from an I/O failure on the origin root.
    pub fn traversal(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SyncError::Traversal {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transfer(path: impl Into<PathBuf>, key: &str, reason: impl ToString) -> Self {
        SyncError::Transfer {
            path: path.into(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config {
            message: message.into(),
        }
    }

    /// Short label for the error class, used in the CLI summary.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Io { .. } => "io",
            SyncError::Traversal { .. } => "traversal",
            SyncError::Remote { .. } => "remote",
            SyncError::Transfer { .. } => "transfer",
            SyncError::Pattern { .. } => "pattern",
            SyncError::Config { .. } => "config",
        }
    }
}
