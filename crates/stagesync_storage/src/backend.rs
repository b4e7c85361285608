//! Blob store trait definition.

use crate::error::StorageResult;
use stagesync_codec::BlobKey;

/// Physical store for binary payloads (attachment files and the like).
///
/// Stores are keyed by [`BlobKey`] and know nothing about the rows the
/// binaries belong to.
///
/// # Invariants
///
/// - `save` followed by `load` returns the saved bytes
/// - `delete` of a missing blob is not an error
/// - Stores must be `Send + Sync`; concurrent writers of the same key are
///   serialized by the store
pub trait BlobStore: Send + Sync {
    /// Writes `data` under `key`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn save(&self, key: &BlobKey, data: &[u8]) -> StorageResult<()>;

    /// Reads the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob exists but cannot be read.
    fn load(&self, key: &BlobKey) -> StorageResult<Option<Vec<u8>>>;

    /// Removes the blob stored under `key`.
    ///
    /// Returns true if a blob was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn delete(&self, key: &BlobKey) -> StorageResult<bool>;

    /// Makes sure `data` is present under `key`, writing only when the
    /// stored content differs.
    ///
    /// Returns true if a write happened.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    fn ensure(&self, key: &BlobKey, data: &[u8]) -> StorageResult<bool> {
        if self.load(key)?.as_deref() == Some(data) {
            return Ok(false);
        }
        self.save(key, data)?;
        Ok(true)
    }
}
