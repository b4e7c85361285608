//! In-memory blob store for testing.

use crate::backend::BlobStore;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use stagesync_codec::BlobKey;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An in-memory blob store.
///
/// Suitable for unit and integration tests. Writes can be made to fail on
/// demand to exercise rollback paths.
///
/// # Example
///
/// ```rust
/// use stagesync_codec::BlobKey;
/// use stagesync_storage::{BlobStore, MemoryBlobStore};
///
/// let store = MemoryBlobStore::new();
/// let key = BlobKey::new(Default::default(), "txt");
/// store.save(&key, b"hello").unwrap();
/// assert_eq!(store.load(&key).unwrap().as_deref(), Some(&b"hello"[..]));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<BlobKey, Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn save(&self, key: &BlobKey, data: &[u8]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected {
                key: key.file_name(),
                reason: "writes disabled".into(),
            });
        }
        self.blobs.write().insert(key.clone(), data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, key: &BlobKey) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn delete(&self, key: &BlobKey) -> StorageResult<bool> {
        Ok(self.blobs.write().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> BlobKey {
        BlobKey::new(Default::default(), "bin")
    }

    #[test]
    fn ensure_skips_identical_content() {
        let store = MemoryBlobStore::new();
        assert!(store.ensure(&key(), b"abc").unwrap());
        assert!(!store.ensure(&key(), b"abc").unwrap());
        assert!(store.ensure(&key(), b"abd").unwrap());
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn failing_writes() {
        let store = MemoryBlobStore::new();
        store.set_fail_writes(true);
        assert!(store.save(&key(), b"x").is_err());
        assert!(store.is_empty());

        store.set_fail_writes(false);
        store.save(&key(), b"x").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_missing_is_ok() {
        let store = MemoryBlobStore::new();
        assert!(!store.delete(&key()).unwrap());
    }
}
