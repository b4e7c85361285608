//! In-memory workflow and version history.

use crate::document::DocumentNode;
use crate::error::{StagingError, StagingResult};
use crate::host::{StepTransition, Workflow, WorkflowService, WorkflowStep};
use parking_lot::RwLock;
use stagesync_codec::Row;
use std::collections::BTreeMap;

/// A stored version history record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    /// Document the version belongs to.
    pub document_id: i64,
    /// Version columns.
    pub row: Row,
    /// Whether this is the published version.
    pub published: bool,
}

#[derive(Debug, Default)]
struct WorkflowState {
    scopes: Vec<(String, Workflow)>,
    steps: BTreeMap<i64, i64>,
    transitions: Vec<StepTransition>,
    versions: BTreeMap<i64, StoredVersion>,
    attachment_versions: BTreeMap<i64, (i64, Row)>,
}

/// Workflow service held in memory.
///
/// Workflows are assigned to alias path prefixes; the longest matching
/// prefix wins.
#[derive(Debug, Default)]
pub struct MemoryWorkflowService {
    state: RwLock<WorkflowState>,
}

impl MemoryWorkflowService {
    /// Creates a service with no workflows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Governs every node under `path_prefix` with `workflow`.
    pub fn assign(&self, path_prefix: impl Into<String>, workflow: Workflow) {
        self.state.write().scopes.push((path_prefix.into(), workflow));
    }

    /// Logged transitions, oldest first.
    pub fn transitions(&self) -> Vec<StepTransition> {
        self.state.read().transitions.clone()
    }

    /// Versions of a document, oldest first.
    pub fn versions_of(&self, document_id: i64) -> Vec<(i64, StoredVersion)> {
        self.state
            .read()
            .versions
            .iter()
            .filter(|(_, v)| v.document_id == document_id)
            .map(|(id, v)| (*id, v.clone()))
            .collect()
    }

    /// Attachment history rows of a version.
    pub fn attachment_versions(&self, version_id: i64) -> Vec<(i64, Row)> {
        self.state
            .read()
            .attachment_versions
            .iter()
            .filter(|(_, (v, _))| *v == version_id)
            .map(|(id, (_, row))| (*id, row.clone()))
            .collect()
    }
}

impl WorkflowService for MemoryWorkflowService {
    fn workflow_for(&self, node: &DocumentNode) -> StagingResult<Option<Workflow>> {
        let path = node.alias_path();
        Ok(self
            .state
            .read()
            .scopes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, wf)| wf.clone()))
    }

    fn current_step(&self, document_id: i64) -> StagingResult<Option<i64>> {
        Ok(self.state.read().steps.get(&document_id).copied())
    }

    fn set_step(&self, document_id: i64, step: &WorkflowStep) -> StagingResult<()> {
        self.state.write().steps.insert(document_id, step.id);
        Ok(())
    }

    fn log_transition(&self, transition: &StepTransition) -> StagingResult<()> {
        self.state.write().transitions.push(transition.clone());
        Ok(())
    }

    fn purge_pending_versions(&self, document_id: i64) -> StagingResult<usize> {
        let mut state = self.state.write();
        let before = state.versions.len();
        state
            .versions
            .retain(|_, v| v.document_id != document_id || v.published);
        let removed: Vec<i64> = state
            .attachment_versions
            .iter()
            .filter(|(_, (version, _))| !state.versions.contains_key(version))
            .map(|(id, _)| *id)
            .collect();
        for id in removed {
            state.attachment_versions.remove(&id);
        }
        Ok(before - state.versions.len())
    }

    fn create_version(&self, document_id: i64, version: &Row) -> StagingResult<i64> {
        let mut state = self.state.write();
        let id = state.versions.keys().next_back().map_or(1, |id| id + 1);
        state.versions.insert(
            id,
            StoredVersion {
                document_id,
                row: version.clone(),
                published: false,
            },
        );
        Ok(id)
    }

    fn create_attachment_version(&self, version_id: i64, attachment: &Row) -> StagingResult<i64> {
        let mut state = self.state.write();
        if !state.versions.contains_key(&version_id) {
            return Err(StagingError::host(format!("version {version_id} does not exist")));
        }
        let id = state
            .attachment_versions
            .keys()
            .next_back()
            .map_or(1, |id| id + 1);
        state
            .attachment_versions
            .insert(id, (version_id, attachment.clone()));
        Ok(id)
    }

    fn publish_version(&self, document_id: i64, version_id: i64) -> StagingResult<()> {
        let mut state = self.state.write();
        if !state
            .versions
            .get(&version_id)
            .is_some_and(|v| v.document_id == document_id)
        {
            return Err(StagingError::host(format!(
                "version {version_id} does not belong to document {document_id}"
            )));
        }
        for (id, version) in state.versions.iter_mut() {
            if version.document_id == document_id {
                version.published = *id == version_id;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::columns::NODE_ALIAS_PATH;
    use crate::host::StepKind;

    fn workflow(name: &str) -> Workflow {
        Workflow {
            id: 1,
            name: name.into(),
            auto_publish: false,
            uses_check_in_out: false,
            steps: vec![WorkflowStep {
                id: 1,
                name: "edit".into(),
                kind: StepKind::Edit,
                order: 1,
            }],
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let service = MemoryWorkflowService::new();
        service.assign("/", workflow("site"));
        service.assign("/News", workflow("news"));
        let node = DocumentNode::new(Row::new().with(NODE_ALIAS_PATH, "/News/Today"), None);
        assert_eq!(service.workflow_for(&node).unwrap().unwrap().name, "news");
        let other = DocumentNode::new(Row::new().with(NODE_ALIAS_PATH, "/About"), None);
        assert_eq!(service.workflow_for(&other).unwrap().unwrap().name, "site");
    }

    #[test]
    fn purge_keeps_published_version() {
        let service = MemoryWorkflowService::new();
        let v1 = service.create_version(5, &Row::new()).unwrap();
        let v2 = service.create_version(5, &Row::new()).unwrap();
        service.create_attachment_version(v2, &Row::new()).unwrap();
        service.publish_version(5, v1).unwrap();

        assert_eq!(service.purge_pending_versions(5).unwrap(), 1);
        let versions = service.versions_of(5);
        assert_eq!(versions.len(), 1);
        assert!(versions[0].1.published);
        assert!(service.attachment_versions(v2).is_empty());
        assert!(service.publish_version(6, v1).is_err());
    }
}
