//! Error types for blob storage.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during blob storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store refused the write.
    #[error("write rejected for {key}: {reason}")]
    WriteRejected {
        /// File name of the blob.
        key: String,
        /// Why the write was rejected.
        reason: String,
    },

    /// The stored file is corrupted.
    #[error("blob corrupted: {0}")]
    Corrupted(String),
}
