//! One-shot retry of objects whose references did not resolve.

use super::object::update_object;
use crate::engine::Engine;
use crate::error::{StagingError, StagingResult};
use crate::types::SyncOutcome;
use std::collections::VecDeque;
use tracing::{debug, info_span};

/// A deferred object: a row of the task's change-set plus the columns that
/// did not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessEntry {
    /// Table (object type) holding the row.
    pub object_type: String,
    /// Row position within the table.
    pub index: usize,
    /// Nesting depth the object was reached at.
    pub depth: usize,
    /// Reference columns that did not resolve.
    pub columns: Vec<String>,
}

/// Deferred objects in the order they were deferred.
#[derive(Debug, Default)]
pub struct PostProcessQueue {
    entries: VecDeque<PostProcessEntry>,
}

impl PostProcessQueue {
    /// Defers an object. A row already queued is not queued twice.
    pub fn push(&mut self, entry: PostProcessEntry) {
        let queued = self
            .entries
            .iter()
            .any(|e| e.object_type == entry.object_type && e.index == entry.index);
        if !queued {
            self.entries.push_back(entry);
        }
    }

    /// Takes the oldest entry.
    pub fn pop(&mut self) -> Option<PostProcessEntry> {
        self.entries.pop_front()
    }

    /// Number of deferred objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is deferred.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Retries every deferred object once. An object that still does not
/// resolve fails the task with a translation error naming its columns.
pub(crate) fn process_post_queue(engine: &mut Engine<'_>) -> StagingResult<()> {
    if engine.post_queue.is_empty() {
        return Ok(());
    }
    let _span = info_span!("post_process", deferred = engine.post_queue.len()).entered();

    if !engine.config.process_post_queue {
        if let Some(entry) = engine.post_queue.pop() {
            return Err(StagingError::translation(entry.object_type, entry.columns));
        }
    }

    let task = engine.task;
    while let Some(entry) = engine.post_queue.pop() {
        let descriptor = engine.descriptor(&entry.object_type)?;
        let row = task
            .change_set
            .rows(&entry.object_type)
            .get(entry.index)
            .ok_or_else(|| {
                StagingError::structural(format!(
                    "deferred row {} of '{}' is gone",
                    entry.index, entry.object_type
                ))
            })?;
        debug!(object_type = %entry.object_type, columns = ?entry.columns, "retrying");
        if let SyncOutcome::Applied(id) =
            update_object(engine, &descriptor, row, true, entry.depth)?
        {
            engine.outcome.deferred_resolved += 1;
            engine.observer.on_resolved(&entry.object_type, id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(object_type: &str, index: usize) -> PostProcessEntry {
        PostProcessEntry {
            object_type: object_type.into(),
            index,
            depth: 1,
            columns: vec!["TagGroupID".into()],
        }
    }

    #[test]
    fn queue_is_fifo_and_dedups() {
        let mut queue = PostProcessQueue::default();
        queue.push(entry("cms.tag", 0));
        queue.push(entry("cms.tag", 1));
        queue.push(entry("cms.tag", 0));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().map(|e| e.index), Some(0));
        assert_eq!(queue.pop().map(|e| e.index), Some(1));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }
}
