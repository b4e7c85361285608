//! Progress callbacks and task outcome.

use uuid::Uuid;

/// Receives progress notifications while a task is processed.
///
/// Every method has an empty default body.
pub trait TaskObserver {
    /// An object was inserted or updated on the target.
    fn on_applied(&self, _object_type: &str, _target_id: i64) {}

    /// An object was deleted from the target.
    fn on_deleted(&self, _object_type: &str, _target_id: i64) {}

    /// An object was put on the post-process queue.
    fn on_deferred(&self, _object_type: &str, _columns: &[String]) {}

    /// A deferred object was applied on the post-process pass.
    fn on_resolved(&self, _object_type: &str, _target_id: i64) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TaskObserver for NoopObserver {}

/// The root object a task produced on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedObject {
    /// Object type, or document class for documents.
    pub object_type: String,
    /// Target identifier (node identifier for documents).
    pub target_id: i64,
    /// Object or node GUID.
    pub guid: Option<Uuid>,
    /// Culture version, for documents.
    pub culture: Option<String>,
}

/// Summary of one processed task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Root object, or `None` when the task deleted it or had nothing to do.
    pub object: Option<AppliedObject>,
    /// Objects inserted or updated, sub-objects included.
    pub applied: usize,
    /// Objects deleted, sub-objects included.
    pub deleted: usize,
    /// Deferred objects that resolved on the post-process pass.
    pub deferred_resolved: usize,
}
