//! # stagesync storage
//!
//! Physical stores for the binary payloads that accompany staging tasks.
//!
//! Stores are **opaque byte stores** keyed by GUID and extension; they do
//! not know which rows their binaries belong to.
//!
//! ## Available stores
//!
//! - [`MemoryBlobStore`] - For testing
//! - [`FileBlobStore`] - One file per blob under a root directory
//!
//! ## Example
//!
//! ```rust
//! use stagesync_codec::BlobKey;
//! use stagesync_storage::{BlobStore, MemoryBlobStore};
//!
//! let store = MemoryBlobStore::new();
//! let key = BlobKey::new(Default::default(), "txt");
//! assert!(store.ensure(&key, b"hello").unwrap());
//! assert!(!store.ensure(&key, b"hello").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::BlobStore;
pub use error::{StorageError, StorageResult};
pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;
