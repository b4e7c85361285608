//! # Stagesync Core
//!
//! Replays serialized change tasks from a source environment onto a target
//! environment.
//!
//! This crate provides:
//! - Task decoding against the table shape of each task kind
//! - Identifier translation between source and target, seeded by the task
//! - Generic upsert of typed objects with child and binding reconciliation
//! - Document tree synchronization (cultures, links, sub-state, ACLs,
//!   workflow and version history)
//! - A post-process pass retrying objects whose dependencies arrived late
//! - In-memory host collaborators for tests and tooling
//!
//! The engine owns no persistent state. It reads and writes through the
//! collaborator traits in [`host`], bundled in a [`Host`].
//!
//! ```rust,ignore
//! use stagesync_core::{ChangeTask, Host, ObjectRegistry, StagingConfig, StagingService, TaskKind};
//!
//! let service = StagingService::new(Host::in_memory(registry), StagingConfig::default());
//! let outcome = service.process_task(&ChangeTask::new(TaskKind::UpdateObject, "cms.tag", payload))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod decoder;
pub mod document;
mod engine;
mod error;
pub mod host;
pub mod memory;
mod object;
mod observer;
mod service;
mod sync;
mod translation;
mod types;

pub use config::{StagingConfig, DEFAULT_NON_VERSIONED_COLUMNS};
pub use decoder::{decode_task, table_shape, DecodedTask, TableShape};
pub use document::DocumentNode;
pub use error::{StagingError, StagingResult};
pub use host::{
    CacheInvalidator, DocumentRepository, EventLog, Host, ObjectStore, ReplicationLog,
    ReplicationRecord, StepKind, StepTransition, Workflow, WorkflowService, WorkflowStep,
};
pub use object::{
    BinaryColumns, ExcludedColumn, GenericObject, ObjectConstructor, ObjectRegistry,
    ObjectTypeDescriptor, ParentLink, Reference, StagedObject,
};
pub use observer::{AppliedObject, NoopObserver, TaskObserver, TaskOutcome};
pub use service::StagingService;
pub use sync::{
    CustomHook, HookContext, IdentityOverride, MergeOverride, PostApplyHook, PostProcessEntry,
    PostProcessQueue,
};
pub use translation::{SeedResolver, TranslationTable};
pub use types::{
    ChangeTask, GroupRef, MergePolicy, ProcessOptions, SourceUser, SyncOutcome, TaskKind,
};

/// Version of the engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
