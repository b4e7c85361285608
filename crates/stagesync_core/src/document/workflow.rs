//! Workflow steps and version history.

use super::node::columns::*;
use super::node::{DocumentNode, ATTACHMENT_HISTORY_TABLE, NODE_TYPE, VERSION_HISTORY_TABLE};
use super::tree::{self, find_target, finish, required_node_id, SourceDocument};
use crate::engine::Engine;
use crate::error::{StagingError, StagingResult};
use crate::host::{StepKind, StepTransition, Workflow, WorkflowStep};
use crate::observer::AppliedObject;
use crate::types::TaskKind;
use stagesync_codec::{BlobKey, Row, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// Applies a `PublishDocument` task.
///
/// Without version history rows the task is applied as a plain update.
/// Otherwise each version is replayed oldest first.
#[instrument(level = "debug", skip_all, fields(class = %engine.task.object_type))]
pub(crate) fn publish(engine: &mut Engine<'_>) -> StagingResult<AppliedObject> {
    let task = engine.task;
    let mut versions: Vec<&Row> = task.change_set.rows(VERSION_HISTORY_TABLE).iter().collect();
    if versions.is_empty() {
        debug!("no version history; applying as update");
        return tree::create_or_update(engine);
    }
    versions.sort_by_key(|v| v.id(VERSION_HISTORY_ID).unwrap_or_default());

    let src = SourceDocument::from_task(engine)?;
    let target = tree::apply_document(engine, &src)?;
    let node_id = required_node_id(&target)?;
    let document_id = target.document_id().ok_or_else(|| {
        StagingError::structural("publish task carries no culture version of the document")
    })?;

    let host = engine.host;
    let now = now_millis();
    // Old attachment history id -> new attachment history id.
    let mut attachment_ids: HashMap<i64, i64> = HashMap::new();
    let mut last_step = None;
    for version in versions {
        copy_non_versioned(engine, node_id, target.culture_code(), version)?;
        let purged = host.workflow.purge_pending_versions(document_id)?;

        let mut record = version.clone();
        record.remove(VERSION_HISTORY_ID);
        record.set(VERSION_DOCUMENT_ID, document_id);
        let version_id = host.workflow.create_version(document_id, &record)?;
        debug!(version_id, purged, "version created");

        if let Some(source_version) = version.id(VERSION_HISTORY_ID) {
            copy_attachment_history(engine, source_version, version_id, &mut attachment_ids)?;
        }
        let publish_from = version.integer(VERSION_PUBLISH_FROM).unwrap_or(i64::MIN);
        if publish_from <= now {
            host.workflow.publish_version(document_id, version_id)?;
            debug!(version_id, "version published");
        }
        last_step = version.text(VERSION_STEP_NAME).map(str::to_string);
    }

    let current = host
        .documents
        .node_by_id(node_id, target.culture_code())?
        .ok_or_else(|| StagingError::host(format!("node {node_id} vanished during publish")))?;
    if let Some(workflow) = host.workflow.workflow_for(&current)? {
        if let Some(step) = workflow.find_step(StepKind::Published, last_step.as_deref()) {
            let step = step.clone();
            move_to(engine, &workflow, document_id, &step)?;
        }
    }
    finish(engine, &src, &current)
}

/// Copies the columns that version history does not track onto the live
/// node and culture version.
fn copy_non_versioned(
    engine: &mut Engine<'_>,
    node_id: i64,
    culture: Option<&str>,
    version: &Row,
) -> StagingResult<()> {
    let host = engine.host;
    let config = engine.config;
    let Some(mut document) = host.documents.node_by_id(node_id, culture)? else {
        return Ok(());
    };
    let mut changed = false;
    for column in &config.non_versioned_columns {
        if !version.contains(column) || column == NODE_PARENT_ID || column == NODE_ALIAS_PATH {
            continue;
        }
        let mut value = version.get(column).clone();
        if column == NODE_OWNER {
            value = match value.as_id() {
                Some(source) => engine.translate_id(super::node::USER_TYPE, source)?.into(),
                None => Value::Null,
            };
        }
        if column.starts_with("Node") {
            document.node.set(column.clone(), value);
        } else if let Some(culture) = document.culture.as_mut() {
            culture.set(column.clone(), value);
        }
        changed = true;
    }
    if changed && !document.is_link() {
        host.documents.update(&document)?;
    }
    Ok(())
}

fn copy_attachment_history(
    engine: &Engine<'_>,
    source_version: i64,
    version_id: i64,
    attachment_ids: &mut HashMap<i64, i64>,
) -> StagingResult<()> {
    let host = engine.host;
    let task = engine.task;
    let mut rows: Vec<&Row> = task
        .change_set
        .rows(ATTACHMENT_HISTORY_TABLE)
        .iter()
        .filter(|r| r.id(ATTACHMENT_HISTORY_VERSION_ID) == Some(source_version))
        .collect();
    // Variant parents carry lower identifiers than their variants.
    rows.sort_by_key(|r| r.id(ATTACHMENT_HISTORY_ID).unwrap_or_default());

    for row in rows {
        let mut copy = row.clone();
        copy.remove(ATTACHMENT_HISTORY_ID);
        copy.set(ATTACHMENT_HISTORY_VERSION_ID, version_id);
        if let Some(parent) = row.id(ATTACHMENT_HISTORY_VARIANT_PARENT_ID) {
            copy.set(
                ATTACHMENT_HISTORY_VARIANT_PARENT_ID,
                attachment_ids.get(&parent).copied(),
            );
        }
        let id = host.workflow.create_attachment_version(version_id, &copy)?;
        if let Some(old) = row.id(ATTACHMENT_HISTORY_ID) {
            attachment_ids.insert(old, id);
        }

        if let Some(guid) = row.guid(ATTACHMENT_GUID) {
            let key = BlobKey::new(guid, row.text("AttachmentExtension").unwrap_or_default());
            if let Some(data) = task.blobs.get(&key) {
                host.blobs.ensure(&key, data)?;
            }
        }
    }
    Ok(())
}

/// Moves a document to the published step when the source was published,
/// or when its workflow publishes automatically and nobody has to check it
/// in first.
pub(crate) fn auto_advance(
    engine: &mut Engine<'_>,
    target: &DocumentNode,
    source_published: bool,
) -> StagingResult<()> {
    let host = engine.host;
    let Some(document_id) = target.document_id() else {
        return Ok(());
    };
    let Some(workflow) = host.workflow.workflow_for(target)? else {
        return Ok(());
    };
    let automatic =
        workflow.auto_publish && !engine.config.check_in_out && !workflow.uses_check_in_out;
    if !source_published && !automatic {
        return Ok(());
    }
    let Some(step) = workflow.find_step(StepKind::Published, None).cloned() else {
        return Ok(());
    };
    if host.workflow.current_step(document_id)? == Some(step.id) {
        return Ok(());
    }
    move_to(engine, &workflow, document_id, &step)
}

/// Applies `ArchiveDocument` and `RejectDocument`.
///
/// A document outside any workflow is left alone.
pub(crate) fn change_step(engine: &mut Engine<'_>) -> StagingResult<Option<AppliedObject>> {
    let src = SourceDocument::from_task(engine)?;
    let host = engine.host;
    let target = find_target(engine, &src, src.culture())?
        .filter(|d| d.document_id().is_some())
        .ok_or_else(|| {
            StagingError::dependency_not_found(format!(
                "document '{}' ({}) does not exist on the target; synchronize it first",
                src.alias_path,
                src.culture().unwrap_or("any culture")
            ))
        })?;
    let document_id = target.document_id().unwrap_or_default();
    let Some(workflow) = host.workflow.workflow_for(&target)? else {
        debug!(document_id, "document has no workflow; step unchanged");
        return Ok(None);
    };

    let task = engine.task;
    let named = task.change_set.parameter(PARAM_STEP_NAME).as_text();
    let current = host
        .workflow
        .current_step(document_id)?
        .and_then(|id| workflow.step(id))
        .or_else(|| workflow.first_step())
        .cloned();
    let step = match engine.kind() {
        TaskKind::ArchiveDocument => workflow.find_step(StepKind::Archived, named),
        _ => match (named, &current) {
            (Some(name), _) => workflow.find_step(StepKind::Edit, Some(name)),
            (None, Some(current)) => workflow
                .previous_step(current)
                .or_else(|| workflow.first_step()),
            (None, None) => workflow.first_step(),
        },
    }
    .cloned()
    .ok_or_else(|| {
        StagingError::not_supported(format!(
            "workflow '{}' has no step for {}",
            workflow.name,
            engine.kind()
        ))
    })?;

    move_to(engine, &workflow, document_id, &step)?;
    if let (Some(source), Some(node_id)) = (src.node_id, target.node_id()) {
        engine
            .translations
            .add_translation(NODE_TYPE, source, node_id, None);
    }
    finish(engine, &src, &target).map(Some)
}

fn move_to(
    engine: &Engine<'_>,
    workflow: &Workflow,
    document_id: i64,
    step: &WorkflowStep,
) -> StagingResult<()> {
    let service = &engine.host.workflow;
    let from = service
        .current_step(document_id)?
        .and_then(|id| workflow.step(id))
        .map(|s| s.name.clone());
    service.set_step(document_id, step)?;
    service.log_transition(&StepTransition {
        document_id,
        from,
        to: step.name.clone(),
        user: engine.origin.source_user.map(|u| u.name.clone()),
    })?;
    debug!(document_id, step = %step.name, "workflow step changed");
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
