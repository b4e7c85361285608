//! Collaborator interfaces the host system provides.
//!
//! The engine never owns persistent state. Everything it reads or writes goes
//! through the traits below, bundled in a [`Host`]. In-memory implementations
//! live in [`crate::memory`].

use crate::document::DocumentNode;
use crate::error::StagingResult;
use crate::memory::{
    MemoryCache, MemoryDocumentRepository, MemoryEventLog, MemoryObjectStore,
    MemoryReplicationLog, MemoryWorkflowService,
};
use crate::object::{ObjectRegistry, ObjectTypeDescriptor};
use crate::types::{GroupRef, SourceUser, TaskKind};
use stagesync_codec::Row;
use stagesync_storage::{BlobStore, MemoryBlobStore};
use std::sync::Arc;
use uuid::Uuid;

/// Row persistence for non-hierarchical objects.
///
/// Rows are keyed by the descriptor's identifier column.
pub trait ObjectStore: Send + Sync {
    /// Loads the row with identifier `id`.
    fn get(&self, descriptor: &ObjectTypeDescriptor, id: i64) -> StagingResult<Option<Row>>;

    /// Returns every row whose columns equal all columns of `criteria`
    /// (`Null` matches a missing or null column), ordered by identifier.
    fn find(&self, descriptor: &ObjectTypeDescriptor, criteria: &Row) -> StagingResult<Vec<Row>>;

    /// Inserts a row and returns its identifier. `preferred_id` is used
    /// when given and must be free.
    fn insert(
        &self,
        descriptor: &ObjectTypeDescriptor,
        row: &Row,
        preferred_id: Option<i64>,
    ) -> StagingResult<i64>;

    /// Replaces the row carrying the same identifier.
    fn update(&self, descriptor: &ObjectTypeDescriptor, row: &Row) -> StagingResult<()>;

    /// Deletes a row; returns true if it existed.
    fn delete(&self, descriptor: &ObjectTypeDescriptor, id: i64) -> StagingResult<bool>;
}

/// The hierarchical document tree.
pub trait DocumentRepository: Send + Sync {
    /// The root node of a site.
    fn root(&self, site_id: Option<i64>) -> StagingResult<Option<DocumentNode>>;

    /// Looks a node up by GUID, loading `culture` when given.
    fn node_by_guid(
        &self,
        site_id: Option<i64>,
        guid: Uuid,
        culture: Option<&str>,
    ) -> StagingResult<Option<DocumentNode>>;

    /// Looks a node up by alias path.
    fn node_by_alias_path(
        &self,
        site_id: Option<i64>,
        alias_path: &str,
        culture: Option<&str>,
    ) -> StagingResult<Option<DocumentNode>>;

    /// Looks a node up by identifier.
    fn node_by_id(&self, node_id: i64, culture: Option<&str>) -> StagingResult<Option<DocumentNode>>;

    /// Culture codes present for a node.
    fn cultures(&self, node_id: i64) -> StagingResult<Vec<String>>;

    /// Direct children of a node, ordered by `NodeOrder`.
    fn child_nodes(&self, node_id: i64) -> StagingResult<Vec<DocumentNode>>;

    /// Inserts a node with its first culture version under `parent_id`.
    fn insert_node(&self, parent_id: i64, node: &Row, culture: &Row) -> StagingResult<DocumentNode>;

    /// Adds a culture version to an existing node.
    fn insert_culture(&self, node_id: i64, culture: &Row) -> StagingResult<DocumentNode>;

    /// Creates a link under `parent_id` pointing at `linked_node_id`.
    fn insert_link(&self, parent_id: i64, linked_node_id: i64, node: &Row) -> StagingResult<DocumentNode>;

    /// Writes back node and culture columns.
    fn update(&self, document: &DocumentNode) -> StagingResult<()>;

    /// Re-parents a node and its subtree.
    fn move_node(&self, node_id: i64, new_parent_id: i64) -> StagingResult<DocumentNode>;

    /// Deletes one culture version; the node goes with its last culture.
    fn delete_culture(&self, node_id: i64, culture: &str) -> StagingResult<bool>;

    /// Deletes a node, all its cultures and its subtree.
    fn delete_node(&self, node_id: i64) -> StagingResult<bool>;
}

/// Kind of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Editing step (the first step of every workflow).
    Edit,
    /// Custom approval step.
    Custom,
    /// Published step.
    Published,
    /// Archived step.
    Archived,
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStep {
    /// Step identifier.
    pub id: i64,
    /// Step code name.
    pub name: String,
    /// Step kind.
    pub kind: StepKind,
    /// Position within the workflow.
    pub order: i64,
}

/// A workflow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    /// Workflow identifier.
    pub id: i64,
    /// Workflow code name.
    pub name: String,
    /// Documents move straight to published after edit.
    pub auto_publish: bool,
    /// Editors must check documents out before editing.
    pub uses_check_in_out: bool,
    /// Steps, in any order.
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Step by identifier.
    pub fn step(&self, id: i64) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The first edit step.
    pub fn first_step(&self) -> Option<&WorkflowStep> {
        self.steps
            .iter()
            .filter(|s| s.kind == StepKind::Edit)
            .min_by_key(|s| s.order)
    }

    /// The step of `kind`, or the one named `name` when given.
    pub fn find_step(&self, kind: StepKind, name: Option<&str>) -> Option<&WorkflowStep> {
        match name {
            Some(name) => self.steps.iter().find(|s| s.name.eq_ignore_ascii_case(name)),
            None => self
                .steps
                .iter()
                .filter(|s| s.kind == kind)
                .min_by_key(|s| s.order),
        }
    }

    /// The step preceding `current` in workflow order.
    pub fn previous_step(&self, current: &WorkflowStep) -> Option<&WorkflowStep> {
        self.steps
            .iter()
            .filter(|s| s.order < current.order && s.kind != StepKind::Archived)
            .max_by_key(|s| s.order)
    }
}

/// A logged workflow move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTransition {
    /// Document moved.
    pub document_id: i64,
    /// Step name before the move.
    pub from: Option<String>,
    /// Step name after the move.
    pub to: String,
    /// User on whose behalf the move happened.
    pub user: Option<String>,
}

/// Workflow and version history service.
pub trait WorkflowService: Send + Sync {
    /// The workflow governing a node, if any.
    fn workflow_for(&self, node: &DocumentNode) -> StagingResult<Option<Workflow>>;

    /// Current step identifier of a document.
    fn current_step(&self, document_id: i64) -> StagingResult<Option<i64>>;

    /// Moves a document to `step`.
    fn set_step(&self, document_id: i64, step: &WorkflowStep) -> StagingResult<()>;

    /// Appends a workflow history entry.
    fn log_transition(&self, transition: &StepTransition) -> StagingResult<()>;

    /// Removes unpublished versions of a document; returns how many.
    fn purge_pending_versions(&self, document_id: i64) -> StagingResult<usize>;

    /// Stores a version history record; returns its identifier.
    fn create_version(&self, document_id: i64, version: &Row) -> StagingResult<i64>;

    /// Stores an attachment history record for a version.
    fn create_attachment_version(&self, version_id: i64, attachment: &Row) -> StagingResult<i64>;

    /// Marks a version as the published one.
    fn publish_version(&self, document_id: i64, version_id: i64) -> StagingResult<()>;
}

/// Cache dependency notification.
pub trait CacheInvalidator: Send + Sync {
    /// Invalidates entries depending on any of `keys`.
    fn touch(&self, keys: &[String]);

    /// Drops a document from the search index.
    fn invalidate_search(&self, _node_id: i64, _culture: Option<&str>) {}
}

/// Operator-visible event log.
pub trait EventLog: Send + Sync {
    /// Records an error.
    fn log_error(&self, source: &str, event_code: &str, message: &str);
}

/// A change recorded for relay to further downstream environments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationRecord {
    /// Kind of change.
    pub task_kind: TaskKind,
    /// Object type (document class for documents).
    pub object_type: String,
    /// Identifier on this environment.
    pub target_id: i64,
    /// Object or node GUID.
    pub guid: Option<Uuid>,
    /// Site the change belongs to.
    pub site_id: Option<i64>,
    /// Original author.
    pub source_user: Option<SourceUser>,
    /// Task groups carried over from the incoming task.
    pub task_groups: Vec<GroupRef>,
}

/// Forward-replication log.
pub trait ReplicationLog: Send + Sync {
    /// Appends a record.
    fn append(&self, record: ReplicationRecord) -> StagingResult<()>;
}

/// Cache invalidator that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl CacheInvalidator for NoopCache {
    fn touch(&self, _keys: &[String]) {}
}

/// Event log that forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn log_error(&self, source: &str, event_code: &str, message: &str) {
        tracing::error!(source, event_code, "{message}");
    }
}

/// The collaborators one engine works against.
#[derive(Clone)]
pub struct Host {
    /// Object types.
    pub registry: Arc<ObjectRegistry>,
    /// Object rows.
    pub objects: Arc<dyn ObjectStore>,
    /// Document tree.
    pub documents: Arc<dyn DocumentRepository>,
    /// Workflow and versions.
    pub workflow: Arc<dyn WorkflowService>,
    /// Physical files.
    pub blobs: Arc<dyn BlobStore>,
    /// Cache dependencies.
    pub cache: Arc<dyn CacheInvalidator>,
    /// Event log.
    pub events: Arc<dyn EventLog>,
    /// Forward replication.
    pub replication: Arc<dyn ReplicationLog>,
}

impl Host {
    /// Creates a host whose collaborators are all in memory.
    pub fn in_memory(registry: ObjectRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            objects: Arc::new(MemoryObjectStore::new()),
            documents: Arc::new(MemoryDocumentRepository::new()),
            workflow: Arc::new(MemoryWorkflowService::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            cache: Arc::new(MemoryCache::new()),
            events: Arc::new(MemoryEventLog::new()),
            replication: Arc::new(MemoryReplicationLog::new()),
        }
    }

    /// Creates a host around an object store and a document repository;
    /// the remaining collaborators start as in-memory or no-op versions.
    pub fn new(
        registry: ObjectRegistry,
        objects: Arc<dyn ObjectStore>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            objects,
            documents,
            cache: Arc::new(NoopCache),
            events: Arc::new(TracingEventLog),
            ..Self::in_memory(registry)
        }
    }

    /// Replaces the workflow service.
    #[must_use]
    pub fn with_workflow(mut self, workflow: Arc<dyn WorkflowService>) -> Self {
        self.workflow = workflow;
        self
    }

    /// Replaces the blob store.
    #[must_use]
    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    /// Replaces the cache invalidator.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the event log.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventLog>) -> Self {
        self.events = events;
        self
    }

    /// Replaces the replication log.
    #[must_use]
    pub fn with_replication(mut self, replication: Arc<dyn ReplicationLog>) -> Self {
        self.replication = replication;
        self
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
