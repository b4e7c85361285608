//! Core type definitions for staging tasks.

use crate::error::StagingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The kind of change a task describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Create a non-hierarchical object.
    CreateObject,
    /// Update (upsert) a non-hierarchical object.
    UpdateObject,
    /// Delete a non-hierarchical object.
    DeleteObject,
    /// Make an object visible on a site.
    AddToSite,
    /// Remove an object from a site.
    RemoveFromSite,
    /// Create a document.
    CreateDocument,
    /// Update a document.
    UpdateDocument,
    /// Delete one culture version of a document.
    DeleteDocument,
    /// Delete a document in all cultures.
    DeleteAllCultures,
    /// Publish a document, replaying its version history.
    PublishDocument,
    /// Move a document to its archive step.
    ArchiveDocument,
    /// Return a document to a previous workflow step.
    RejectDocument,
    /// Move a document under a new parent.
    MoveDocument,
    /// Give a document its own access-control list.
    BreakAclInheritance,
    /// Make a document inherit its parent's access-control list again.
    RestoreAclInheritance,
}

impl TaskKind {
    /// All task kinds, in declaration order.
    pub const ALL: [TaskKind; 15] = [
        TaskKind::CreateObject,
        TaskKind::UpdateObject,
        TaskKind::DeleteObject,
        TaskKind::AddToSite,
        TaskKind::RemoveFromSite,
        TaskKind::CreateDocument,
        TaskKind::UpdateDocument,
        TaskKind::DeleteDocument,
        TaskKind::DeleteAllCultures,
        TaskKind::PublishDocument,
        TaskKind::ArchiveDocument,
        TaskKind::RejectDocument,
        TaskKind::MoveDocument,
        TaskKind::BreakAclInheritance,
        TaskKind::RestoreAclInheritance,
    ];

    /// Returns the canonical name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::CreateObject => "CreateObject",
            TaskKind::UpdateObject => "UpdateObject",
            TaskKind::DeleteObject => "DeleteObject",
            TaskKind::AddToSite => "AddToSite",
            TaskKind::RemoveFromSite => "RemoveFromSite",
            TaskKind::CreateDocument => "CreateDocument",
            TaskKind::UpdateDocument => "UpdateDocument",
            TaskKind::DeleteDocument => "DeleteDocument",
            TaskKind::DeleteAllCultures => "DeleteAllCultures",
            TaskKind::PublishDocument => "PublishDocument",
            TaskKind::ArchiveDocument => "ArchiveDocument",
            TaskKind::RejectDocument => "RejectDocument",
            TaskKind::MoveDocument => "MoveDocument",
            TaskKind::BreakAclInheritance => "BreakACLInheritance",
            TaskKind::RestoreAclInheritance => "RestoreACLInheritance",
        }
    }

    /// Returns true for kinds handled by the document tree synchronizer.
    pub fn is_document_task(&self) -> bool {
        !matches!(
            self,
            TaskKind::CreateObject
                | TaskKind::UpdateObject
                | TaskKind::DeleteObject
                | TaskKind::AddToSite
                | TaskKind::RemoveFromSite
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = StagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StagingError::not_supported(format!("unknown task kind '{s}'")))
    }
}

/// How aggressively child/binding reconciliation treats target rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Ignore incoming rows.
    None,
    /// Upsert incoming rows; never delete.
    Partial,
    /// Upsert incoming rows and delete target rows absent from the source.
    #[default]
    Complete,
}

/// The user who made the change on the source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    /// User GUID on the source.
    pub guid: Uuid,
    /// User name on the source.
    pub name: String,
}

/// A task group the change belongs to; relayed with forward records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    /// Group identifier.
    pub id: i64,
    /// Group name.
    pub name: String,
}

/// One discrete change as delivered by the transport.
///
/// Consumed exactly once; never mutated while it is processed.
#[derive(Debug, Clone)]
pub struct ChangeTask {
    /// Kind of change.
    pub kind: TaskKind,
    /// Object type (for document tasks, the document class name).
    pub object_type: String,
    /// Serialized change-set.
    pub payload: Vec<u8>,
    /// Serialized blob set, if the change carries binaries.
    pub binary_payload: Option<Vec<u8>>,
    /// Author of the change on the source.
    pub source_user: Option<SourceUser>,
    /// Task groups the change belongs to.
    pub task_groups: Vec<GroupRef>,
}

impl ChangeTask {
    /// Creates a task with no binaries, user, or groups.
    pub fn new(kind: TaskKind, object_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind,
            object_type: object_type.into(),
            payload,
            binary_payload: None,
            source_user: None,
            task_groups: Vec::new(),
        }
    }

    /// Attaches a serialized blob set.
    #[must_use]
    pub fn with_binary(mut self, binary_payload: Vec<u8>) -> Self {
        self.binary_payload = Some(binary_payload);
        self
    }

    /// Sets the source user.
    #[must_use]
    pub fn with_source_user(mut self, user: SourceUser) -> Self {
        self.source_user = Some(user);
        self
    }

    /// Adds a task group.
    #[must_use]
    pub fn with_group(mut self, group: GroupRef) -> Self {
        self.task_groups.push(group);
        self
    }
}

/// Per-call processing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Walk categories, children and bindings of applied objects.
    pub process_children: bool,
    /// The task restores an object from version history instead of staging
    /// a live change; enables the restore identifier policy.
    pub restore: bool,
    /// Do not append forward-replication records for this task.
    pub suppress_logging: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            process_children: true,
            restore: false,
            suppress_logging: false,
        }
    }
}

impl ProcessOptions {
    /// Sets whether children are processed.
    #[must_use]
    pub const fn process_children(mut self, value: bool) -> Self {
        self.process_children = value;
        self
    }

    /// Sets restore mode.
    #[must_use]
    pub const fn restore(mut self, value: bool) -> Self {
        self.restore = value;
        self
    }

    /// Sets whether forward-replication logging is suppressed.
    #[must_use]
    pub const fn suppress_logging(mut self, value: bool) -> Self {
        self.suppress_logging = value;
        self
    }
}

/// Result of applying one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The object was persisted under this target identifier.
    Applied(i64),
    /// Dependencies are not translated yet; the listed columns failed.
    Deferred(Vec<String>),
    /// Nothing to do (e.g. deleting an object absent on target).
    Skipped,
}

impl SyncOutcome {
    /// Target identifier when applied.
    pub fn target_id(&self) -> Option<i64> {
        match self {
            SyncOutcome::Applied(id) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_kind_parsing() {
        assert_eq!("UpdateObject".parse::<TaskKind>().unwrap(), TaskKind::UpdateObject);
        assert_eq!(
            "breakaclinheritance".parse::<TaskKind>().unwrap(),
            TaskKind::BreakAclInheritance
        );
        assert!(matches!(
            "Teleport".parse::<TaskKind>(),
            Err(StagingError::NotSupported { .. })
        ));
    }

    #[test]
    fn every_kind_round_trips_through_its_name() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
    }

    #[test]
    fn document_task_split() {
        assert!(!TaskKind::AddToSite.is_document_task());
        assert!(!TaskKind::DeleteObject.is_document_task());
        assert!(TaskKind::MoveDocument.is_document_task());
        assert!(TaskKind::RestoreAclInheritance.is_document_task());
    }

    #[test]
    fn process_options_defaults() {
        let options = ProcessOptions::default();
        assert!(options.process_children);
        assert!(!options.restore);
        assert!(!options.suppress_logging);

        let options = options.process_children(false).restore(true);
        assert!(!options.process_children);
        assert!(options.restore);
    }
}
