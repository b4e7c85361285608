//! Binary payloads that accompany a task.

use crate::cbor;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Key of one binary payload: the owning row's GUID plus a file extension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobKey {
    /// GUID of the row the binary belongs to.
    pub guid: Uuid,
    /// Lower-case extension without the leading dot.
    pub extension: String,
}

impl BlobKey {
    /// Creates a key, normalizing the extension.
    pub fn new(guid: Uuid, extension: &str) -> Self {
        Self {
            guid,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    /// File name for this blob (`<guid>.<ext>` or `<guid>`).
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.guid.to_string()
        } else {
            format!("{}.{}", self.guid, self.extension)
        }
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// The binary payload set of a task, keyed by [`BlobKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobSet {
    blobs: BTreeMap<BlobKey, Vec<u8>>,
}

impl BlobSet {
    /// Creates an empty blob set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a blob.
    pub fn insert(&mut self, key: BlobKey, data: Vec<u8>) {
        self.blobs.insert(key, data);
    }

    /// Builder-style [`BlobSet::insert`].
    #[must_use]
    pub fn with(mut self, key: BlobKey, data: Vec<u8>) -> Self {
        self.insert(key, data);
        self
    }

    /// Returns the blob stored under `key`.
    pub fn get(&self, key: &BlobKey) -> Option<&[u8]> {
        self.blobs.get(key).map(Vec::as_slice)
    }

    /// Number of blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns true if there are no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Iterates over the blobs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&BlobKey, &Vec<u8>)> {
        self.blobs.iter()
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let rows = self
            .blobs
            .iter()
            .map(|(key, data)| {
                cbor::map(vec![
                    ("guid", Value::Guid(key.guid).to_cbor()),
                    ("extension", Cbor::Text(key.extension.clone())),
                    ("data", Cbor::Bytes(data.clone())),
                ])
            })
            .collect();
        cbor::encode(&cbor::map(vec![("blobs", Cbor::Array(rows))]))
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let value = cbor::decode(bytes)?;
        let map = cbor::as_map(&value, "blob set")?;
        let rows = cbor::field(map, "blobs")
            .ok_or_else(|| CodecError::invalid_structure("missing blobs"))?;

        let mut set = BlobSet::new();
        for row in cbor::as_array(rows, "blobs")? {
            let row = cbor::as_map(row, "blob")?;
            let guid = cbor::field(row, "guid")
                .map(Value::from_cbor)
                .transpose()?
                .and_then(|v| v.as_guid())
                .ok_or_else(|| CodecError::invalid_structure("blob without guid"))?;
            let extension = cbor::optional_text(row, "extension").unwrap_or_default();
            let data = cbor::field(row, "data")
                .and_then(Cbor::as_bytes)
                .ok_or_else(|| CodecError::invalid_structure("blob without data"))?;
            set.insert(BlobKey::new(guid, &extension), data.clone());
        }
        Ok(set)
    }
}
