//! Document sub-state: attachments, variants, categories, aliases,
//! relationships and page templates.

use super::acl;
use super::node::columns::*;
use super::node::{
    DocumentNode, ALIAS_TYPE, ATTACHMENT_TYPE, DOCUMENT_CATEGORY_TYPE, DOCUMENT_TYPE, NODE_TYPE,
    PAGE_TEMPLATE_TYPE, RELATIONSHIP_TYPE, VARIANT_TYPE,
};
use super::tree::{required_node_id, SourceDocument};
use crate::engine::Engine;
use crate::error::{StagingError, StagingResult};
use crate::object::ObjectTypeDescriptor;
use crate::sync::{delete_row, update_object, PostProcessEntry};
use crate::types::SyncOutcome;
use stagesync_codec::Row;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Upserts the page templates a document refers to, ahead of the document.
pub(crate) fn apply_page_templates(engine: &mut Engine<'_>) -> StagingResult<()> {
    let descriptor = engine.descriptor(PAGE_TEMPLATE_TYPE)?;
    let task = engine.task;
    for (index, row) in task.change_set.rows(PAGE_TEMPLATE_TYPE).iter().enumerate() {
        upsert(engine, &descriptor, index, row)?;
    }
    Ok(())
}

/// Brings the sub-state of a written document in line with the source.
pub(crate) fn reconcile(
    engine: &mut Engine<'_>,
    src: &SourceDocument,
    target: &DocumentNode,
) -> StagingResult<()> {
    let target_node = required_node_id(target)?;
    if let (Some(source_document), Some(target_document)) = (src.document_id, target.document_id()) {
        let scope = (source_document, target_document);
        replace_by_guid(engine, ATTACHMENT_TYPE, scope)?;
        replace_by_guid(engine, VARIANT_TYPE, scope)?;
        reinsert(engine, DOCUMENT_CATEGORY_TYPE, DOCUMENT_TYPE, scope)?;
    }
    if let Some(source_node) = src.node_id {
        reinsert(engine, ALIAS_TYPE, NODE_TYPE, (source_node, target_node))?;
    }
    relationships(engine, src, target_node)
}

/// Deferred rows go to the post-process queue.
fn upsert(
    engine: &mut Engine<'_>,
    descriptor: &std::sync::Arc<ObjectTypeDescriptor>,
    index: usize,
    row: &Row,
) -> StagingResult<()> {
    if let SyncOutcome::Deferred(columns) = update_object(engine, descriptor, row, false, 1)? {
        engine.post_queue.push(PostProcessEntry {
            object_type: descriptor.object_type.clone(),
            index,
            depth: 1,
            columns,
        });
    }
    Ok(())
}

/// Deletes the target rows whose GUID the source no longer has, then
/// upserts every source row.
fn replace_by_guid(
    engine: &mut Engine<'_>,
    object_type: &str,
    (source_parent, target_parent): (i64, i64),
) -> StagingResult<()> {
    let descriptor = engine.descriptor(object_type)?;
    let column = descriptor.parent_column_for(DOCUMENT_TYPE)?.to_string();
    let guid_column = descriptor.guid_column.clone().ok_or_else(|| {
        StagingError::structural(format!("{object_type} declares no GUID column"))
    })?;

    let task = engine.task;
    let mut incoming: Vec<(usize, &Row)> = task
        .change_set
        .rows(object_type)
        .iter()
        .enumerate()
        .filter(|(_, row)| row.id(&column) == Some(source_parent))
        .collect();
    // Rows pointing at a sibling row (attachment variants) after their parent.
    incoming.sort_by_key(|(_, row)| {
        descriptor
            .references
            .iter()
            .any(|r| r.target_type == object_type && row.id(&r.column).is_some())
    });
    let keep: HashSet<_> = incoming
        .iter()
        .filter_map(|(_, row)| row.guid(&guid_column))
        .collect();

    let existing = engine
        .host
        .objects
        .find(&descriptor, &Row::new().with(column, target_parent))?;
    for row in existing {
        if !row.guid(&guid_column).is_some_and(|g| keep.contains(&g)) {
            delete_row(engine, &descriptor, &row)?;
        }
    }
    for (index, row) in incoming {
        upsert(engine, &descriptor, index, row)?;
    }
    Ok(())
}

/// Deletes every target row of the parent, then inserts the source rows.
fn reinsert(
    engine: &mut Engine<'_>,
    object_type: &str,
    parent_type: &str,
    (source_parent, target_parent): (i64, i64),
) -> StagingResult<()> {
    let descriptor = engine.descriptor(object_type)?;
    let column = descriptor.parent_column_for(parent_type)?.to_string();
    delete_where(engine, &descriptor, &column, target_parent)?;

    let task = engine.task;
    for (index, row) in task.change_set.rows(object_type).iter().enumerate() {
        if row.id(&column) == Some(source_parent) {
            upsert(engine, &descriptor, index, row)?;
        }
    }
    Ok(())
}

/// Relationships where the document is the left side, matched by right
/// node GUID and relationship name.
fn relationships(
    engine: &mut Engine<'_>,
    src: &SourceDocument,
    target_node: i64,
) -> StagingResult<()> {
    let descriptor = engine.descriptor(RELATIONSHIP_TYPE)?;
    let host = engine.host;
    let task = engine.task;
    let mut existing = host.objects.find(
        &descriptor,
        &Row::new().with(RELATIONSHIP_LEFT_NODE_ID, target_node),
    )?;

    for row in task.change_set.rows(RELATIONSHIP_TYPE) {
        let is_left = row.guid(RELATIONSHIP_LEFT_NODE_GUID) == Some(src.guid)
            || (src.node_id.is_some() && row.id(RELATIONSHIP_LEFT_NODE_ID) == src.node_id);
        if !is_left {
            continue;
        }
        let name = row.text(RELATIONSHIP_NAME).unwrap_or_default();
        let right = match row.guid(RELATIONSHIP_RIGHT_NODE_GUID) {
            Some(guid) => host
                .documents
                .node_by_guid(None, guid, None)?
                .and_then(|n| n.node_id()),
            None => None,
        };
        let Some(right) = right else {
            warn!(
                relationship = name,
                "related document is not on the target; relationship skipped"
            );
            continue;
        };

        let matched = existing.iter().position(|e| {
            e.id(RELATIONSHIP_RIGHT_NODE_ID) == Some(right) && e.text(RELATIONSHIP_NAME) == Some(name)
        });
        let id = match matched {
            Some(position) => {
                let mut current = existing.swap_remove(position);
                current.set(RELATIONSHIP_ORDER, row.get(RELATIONSHIP_ORDER).clone());
                current.set(RELATIONSHIP_CUSTOM_DATA, row.get(RELATIONSHIP_CUSTOM_DATA).clone());
                host.objects.update(&descriptor, &current)?;
                current.id(&descriptor.id_column).unwrap_or_default()
            }
            None => {
                let created = Row::new()
                    .with(RELATIONSHIP_LEFT_NODE_ID, target_node)
                    .with(RELATIONSHIP_RIGHT_NODE_ID, right)
                    .with(RELATIONSHIP_NAME, name)
                    .with(RELATIONSHIP_ORDER, row.get(RELATIONSHIP_ORDER).clone())
                    .with(RELATIONSHIP_CUSTOM_DATA, row.get(RELATIONSHIP_CUSTOM_DATA).clone());
                host.objects.insert(&descriptor, &created, None)?
            }
        };
        engine.touch_object(RELATIONSHIP_TYPE, id);
        engine.record_applied(RELATIONSHIP_TYPE, id);
    }

    if !existing.is_empty() {
        debug!(count = existing.len(), "removing relationships absent from source");
    }
    for row in existing {
        delete_row(engine, &descriptor, &row)?;
    }
    Ok(())
}

/// Removes the sub-state of deleted culture versions and nodes.
pub(crate) fn remove_document_state(
    engine: &mut Engine<'_>,
    document_ids: &[i64],
    node_ids: &[i64],
) -> StagingResult<()> {
    let per_document = [
        (ATTACHMENT_TYPE, ATTACHMENT_DOCUMENT_ID),
        (VARIANT_TYPE, VARIANT_DOCUMENT_ID),
        (DOCUMENT_CATEGORY_TYPE, DOCUMENT_CATEGORY_DOCUMENT_ID),
    ];
    for (object_type, column) in per_document {
        let descriptor = engine.descriptor(object_type)?;
        for &id in document_ids {
            delete_where(engine, &descriptor, column, id)?;
        }
    }

    let per_node = [
        (ALIAS_TYPE, ALIAS_NODE_ID),
        (RELATIONSHIP_TYPE, RELATIONSHIP_LEFT_NODE_ID),
        (RELATIONSHIP_TYPE, RELATIONSHIP_RIGHT_NODE_ID),
    ];
    for (object_type, column) in per_node {
        let descriptor = engine.descriptor(object_type)?;
        for &id in node_ids {
            delete_where(engine, &descriptor, column, id)?;
        }
    }
    for &id in node_ids {
        acl::remove_owned(engine, id)?;
    }
    Ok(())
}

pub(crate) fn delete_where(
    engine: &mut Engine<'_>,
    descriptor: &ObjectTypeDescriptor,
    column: &str,
    value: i64,
) -> StagingResult<()> {
    let rows = engine
        .host
        .objects
        .find(descriptor, &Row::new().with(column, value))?;
    for row in rows {
        delete_row(engine, descriptor, &row)?;
    }
    Ok(())
}
