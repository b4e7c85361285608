//! # stagesync codec
//!
//! Wire format for staging tasks.
//!
//! A task payload is a **change-set**: one named table of rows per affected
//! object type, plus a translation seed table that tells the target how to
//! find the objects the rows refer to. Binary payloads travel separately as
//! a **blob set** keyed by GUID and extension.
//!
//! Both documents are CBOR maps:
//!
//! ```text
//! change-set = { "tables": [ { "name": text, "rows": [ { column: cell } ] } ],
//!                "translations": [ { "object_type", "source_id", "code_name"?,
//!                                    "site_name"?, "group_id"?, "guid"? } ] }
//! blob-set   = { "blobs": [ { "guid", "extension", "data" } ] }
//! ```
//!
//! Cells are null, bool, integer, text, bytes, or a tag-37 GUID.
//!
//! ## Usage
//!
//! ```
//! use stagesync_codec::{ChangeSet, Row, TranslationSeed};
//!
//! let cs = ChangeSet::new()
//!     .with_row("cms.tag", Row::new().with("TagID", 4).with("TagName", "red"))
//!     .with_seed(TranslationSeed::by_code_name("cms.site", 1, "corporate"));
//!
//! let bytes = cs.encode().unwrap();
//! assert_eq!(ChangeSet::decode(&bytes).unwrap(), cs);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob;
mod cbor;
mod error;
mod table;
mod value;

pub use blob::{BlobKey, BlobSet};
pub use error::{CodecError, CodecResult};
pub use table::{ChangeSet, DataTable, Row, TranslationSeed, PARAMETERS_TABLE};
pub use value::Value;

/// Trait for documents that can be encoded to CBOR.
pub trait Encode {
    /// Encode this document to CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for documents that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this document from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for ChangeSet {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        ChangeSet::encode(self)
    }
}

impl Decode for ChangeSet {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        ChangeSet::decode(bytes)
    }
}

impl Encode for BlobSet {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        BlobSet::encode(self)
    }
}

impl Decode for BlobSet {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        BlobSet::decode(bytes)
    }
}
