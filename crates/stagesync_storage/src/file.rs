//! File-system blob store.

use crate::backend::BlobStore;
use crate::error::StorageResult;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use stagesync_codec::BlobKey;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory under the root holding the SHA-256 of every written blob.
const DIGEST_DIR: &str = ".sha256";

/// A blob store that keeps one file per blob under a root directory.
///
/// Files are named `<guid>.<ext>`. Each write also records the content's
/// SHA-256 under `.sha256/`, so [`BlobStore::ensure`] hashes only the
/// incoming data; files without a recorded digest are hashed on demand.
/// Every write, including the compare-before-write of `ensure`, runs under
/// one store-wide lock so that concurrent requests for the same binary
/// write it once.
///
/// # Example
///
/// ```no_run
/// use stagesync_codec::BlobKey;
/// use stagesync_storage::{BlobStore, FileBlobStore};
/// use std::path::Path;
///
/// let store = FileBlobStore::open(Path::new("files")).unwrap();
/// store.save(&BlobKey::new(Default::default(), "pdf"), b"%PDF").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBlobStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root.join(DIGEST_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the file holding `key`.
    #[must_use]
    pub fn path_of(&self, key: &BlobKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    fn digest_path(&self, key: &BlobKey) -> PathBuf {
        self.root.join(DIGEST_DIR).join(key.file_name())
    }

    fn write_file(&self, key: &BlobKey, data: &[u8], sha: &[u8; 32]) -> StorageResult<()> {
        let path = self.path_of(key);
        let tmp = path.with_extension("partial");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        fs::write(self.digest_path(key), sha)?;
        debug!(file = %key, size = data.len(), "blob written");
        Ok(())
    }

    /// Digest of the blob currently on disk, if there is one.
    fn current_digest(&self, key: &BlobKey) -> StorageResult<Option<[u8; 32]>> {
        if !self.path_of(key).exists() {
            return Ok(None);
        }
        match fs::read(self.digest_path(key)) {
            Ok(recorded) => {
                if let Ok(sha) = <[u8; 32]>::try_from(recorded.as_slice()) {
                    return Ok(Some(sha));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(self.load(key)?.map(|existing| digest(&existing)))
    }
}

fn digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

impl BlobStore for FileBlobStore {
    fn save(&self, key: &BlobKey, data: &[u8]) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        self.write_file(key, data, &digest(data))
    }

    fn load(&self, key: &BlobKey) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.path_of(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &BlobKey) -> StorageResult<bool> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.digest_path(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(self.path_of(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure(&self, key: &BlobKey, data: &[u8]) -> StorageResult<bool> {
        let _guard = self.write_lock.lock();
        let sha = digest(data);
        if self.current_digest(key)? == Some(sha) {
            return Ok(false);
        }
        self.write_file(key, data, &sha)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[test]
    fn save_load_delete() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let key = BlobKey::new(Uuid::new_v4(), "txt");

        store.save(&key, b"content").unwrap();
        assert!(store.path_of(&key).exists());
        assert_eq!(store.load(&key).unwrap().as_deref(), Some(&b"content"[..]));

        assert!(store.delete(&key).unwrap());
        assert!(!store.delete(&key).unwrap());
        assert_eq!(store.load(&key).unwrap(), None);
    }

    #[test]
    fn ensure_writes_once() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let key = BlobKey::new(Uuid::new_v4(), "png");

        assert!(store.ensure(&key, b"image").unwrap());
        assert!(!store.ensure(&key, b"image").unwrap());
        assert!(store.ensure(&key, b"image2").unwrap());
    }

    #[test]
    fn ensure_trusts_the_recorded_digest() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let key = BlobKey::new(Uuid::new_v4(), "png");

        store.save(&key, b"image").unwrap();
        let recorded = fs::read(store.digest_path(&key)).unwrap();
        assert_eq!(recorded, digest(b"image"));

        // Only the incoming data is hashed; the file itself is not re-read.
        fs::write(store.path_of(&key), b"edited").unwrap();
        assert!(!store.ensure(&key, b"image").unwrap());

        assert!(store.delete(&key).unwrap());
        assert!(!store.digest_path(&key).exists());
        assert!(store.ensure(&key, b"image").unwrap());
    }

    #[test]
    fn file_without_digest_is_hashed() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let key = BlobKey::new(Uuid::new_v4(), "txt");
        fs::write(store.path_of(&key), b"copied in").unwrap();

        assert!(!store.ensure(&key, b"copied in").unwrap());
        assert!(store.ensure(&key, b"replaced").unwrap());
        assert_eq!(
            fs::read(store.digest_path(&key)).unwrap(),
            digest(b"replaced")
        );
    }

    #[test]
    fn concurrent_ensure_writes_once() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileBlobStore::open(dir.path()).unwrap());
        let key = BlobKey::new(Uuid::new_v4(), "bin");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let key = key.clone();
                std::thread::spawn(move || store.ensure(&key, b"shared").unwrap())
            })
            .collect();

        let writes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|wrote| *wrote)
            .count();
        assert_eq!(writes, 1);
    }

    #[test]
    fn open_creates_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("files");
        let store = FileBlobStore::open(&root).unwrap();
        assert!(store.root().is_dir());
    }
}
