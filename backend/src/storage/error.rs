//! Storage-specific error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the storage directory manager
#[derive(Error, Debug)]
pub enum StorageError {
    /// No stored file with the given name exists
    #[error("File not found: {0}")]
    NotFound(String),

    /// The name is not a plain file name inside the storage root
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    /// Underlying filesystem operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path the operation was targeting
        path: PathBuf,
        /// Original error
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
