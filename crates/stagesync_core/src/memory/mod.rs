//! In-memory collaborator implementations.
//!
//! Useful for tests and for dry-running tasks without a real target.

mod documents;
mod logs;
mod objects;
mod workflow;

pub use documents::MemoryDocumentRepository;
pub use logs::{EventEntry, MemoryCache, MemoryEventLog, MemoryReplicationLog};
pub use objects::MemoryObjectStore;
pub use workflow::{MemoryWorkflowService, StoredVersion};
