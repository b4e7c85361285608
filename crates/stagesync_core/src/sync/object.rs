//! Generic object synchronizer.

use super::post_process::PostProcessEntry;
use crate::engine::Engine;
use crate::error::{StagingError, StagingResult};
use crate::object::{ObjectTypeDescriptor, StagedObject};
use crate::observer::AppliedObject;
use crate::types::SyncOutcome;
use stagesync_codec::{BlobKey, Row};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Applies a `CreateObject`/`UpdateObject` task: the first row of the task's
/// own table is the root object.
pub(crate) fn apply_object_task(engine: &mut Engine<'_>) -> StagingResult<Option<AppliedObject>> {
    let task = engine.task;
    let descriptor = engine.descriptor(&task.object_type)?;
    let row = task.change_set.rows(&task.object_type).first().ok_or_else(|| {
        StagingError::structural(format!("table '{}' has no rows", task.object_type))
    })?;
    let source_id = row.id(&descriptor.id_column);

    if let SyncOutcome::Deferred(columns) = update_object(engine, &descriptor, row, false, 0)? {
        engine.post_queue.push(PostProcessEntry {
            object_type: descriptor.object_type.clone(),
            index: 0,
            depth: 0,
            columns,
        });
    }
    super::process_post_queue(engine)?;

    let target_id = match source_id {
        Some(source_id) => engine.translations.recorded(&descriptor.object_type, source_id),
        None => None,
    };
    target_id
        .map(|id| engine.applied_object(&descriptor, id))
        .transpose()
}

/// Upserts one object and walks its categories, children and bindings.
///
/// `queued` marks the post-process retry: unresolved references are then a
/// translation error instead of a deferral.
#[instrument(level = "trace", skip_all, fields(object_type = %descriptor.object_type, depth))]
pub(crate) fn update_object(
    engine: &mut Engine<'_>,
    descriptor: &Arc<ObjectTypeDescriptor>,
    source_row: &Row,
    queued: bool,
    depth: usize,
) -> StagingResult<SyncOutcome> {
    let host = engine.host;
    let registry = &host.registry;
    let object_type = descriptor.object_type.as_str();
    let source_id = source_row.id(&descriptor.id_column);

    let mut incoming = registry.instantiate(object_type, source_row)?;
    incoming.set_id(None);
    let mut row = incoming.to_row();

    let failed = engine.translate_columns(descriptor, &mut row)?;
    if !failed.is_empty() {
        if queued {
            return Err(StagingError::translation(object_type, failed));
        }
        engine.observer.on_deferred(object_type, &failed);
        return Ok(SyncOutcome::Deferred(failed));
    }

    let existing = engine.find_existing(descriptor, &row)?;
    let (target, previous, preferred_id) = match existing {
        Some(existing) => {
            let existing_id = existing.id(&descriptor.id_column).ok_or_else(|| {
                StagingError::host(format!("{object_type} row without identifier"))
            })?;
            if engine.options.restore {
                check_restore_collision(descriptor, incoming.as_ref(), source_id, &existing, existing_id)?;
            }
            for excluded in &descriptor.excluded_columns {
                row.set(excluded.column.clone(), existing.get(&excluded.column).clone());
            }
            // Merge onto the existing object so the store sees a mutation.
            let mut target = registry.instantiate(object_type, &existing)?;
            target.load_row(&row)?;
            target.set_id(Some(existing_id));
            (target, Some(existing), None)
        }
        None => {
            for excluded in &descriptor.excluded_columns {
                row.set(excluded.column.clone(), excluded.default.clone());
            }
            let preferred_id = match source_id {
                Some(id) if engine.options.restore && descriptor.restore_preserves_id => {
                    if host.objects.get(descriptor, id)?.is_some() {
                        return Err(StagingError::Uniqueness {
                            object_type: object_type.to_string(),
                            code_name: incoming.code_name().unwrap_or_default(),
                            existing_id: id,
                        });
                    }
                    Some(id)
                }
                _ => None,
            };
            (registry.instantiate(object_type, &row)?, None, preferred_id)
        }
    };

    let target_id = persist(engine, descriptor, &target.to_row(), previous.as_ref(), preferred_id)?;
    if let Some(source_id) = source_id {
        let group = descriptor
            .group
            .as_ref()
            .and_then(|g| source_row.id(&g.column));
        engine
            .translations
            .add_translation(object_type, source_id, target_id, group);
    }
    engine.touch_object(object_type, target_id);
    engine.record_applied(object_type, target_id);
    if depth == 0 {
        engine.log_replication(object_type, target_id, target.guid(), target.site_id())?;
    }

    if engine.options.process_children {
        if let Some(source_id) = source_id {
            super::reconcile::process_related(engine, descriptor, source_id, target_id, depth)?;
        }
    }
    super::hooks::run_hooks(engine, descriptor, target_id)?;
    Ok(SyncOutcome::Applied(target_id))
}

/// Restore mode: the identity match must be the restored object itself.
fn check_restore_collision(
    descriptor: &ObjectTypeDescriptor,
    incoming: &dyn StagedObject,
    source_id: Option<i64>,
    existing: &Row,
    existing_id: i64,
) -> StagingResult<()> {
    let same_object = if descriptor.restore_preserves_id {
        source_id == Some(existing_id)
    } else {
        match (&descriptor.guid_column, incoming.guid()) {
            (Some(column), Some(guid)) => existing.guid(column) == Some(guid),
            _ => true,
        }
    };
    if same_object {
        return Ok(());
    }
    Err(StagingError::Uniqueness {
        object_type: descriptor.object_type.clone(),
        code_name: incoming.code_name().unwrap_or_default(),
        existing_id,
    })
}

/// Writes a row and its physical file under a narrow transaction: if the
/// file write fails the row write is undone.
fn persist(
    engine: &Engine<'_>,
    descriptor: &ObjectTypeDescriptor,
    row: &Row,
    previous: Option<&Row>,
    preferred_id: Option<i64>,
) -> StagingResult<i64> {
    let store = &engine.host.objects;
    let id = match previous {
        Some(_) => {
            store.update(descriptor, row)?;
            row.id(&descriptor.id_column).ok_or_else(|| {
                StagingError::host(format!("{} update without identifier", descriptor.object_type))
            })?
        }
        None => store.insert(descriptor, row, preferred_id)?,
    };

    let Some(key) = blob_key(descriptor, row) else {
        return Ok(id);
    };
    let Some(data) = engine.task.blobs.get(&key) else {
        return Ok(id);
    };
    if let Err(err) = engine.host.blobs.ensure(&key, data) {
        warn!(%key, error = %err, "file write failed; undoing row write");
        match previous {
            Some(previous) => store.update(descriptor, previous)?,
            None => {
                store.delete(descriptor, id)?;
            }
        }
        return Err(err.into());
    }
    debug!(%key, "file written");
    Ok(id)
}

fn blob_key(descriptor: &ObjectTypeDescriptor, row: &Row) -> Option<BlobKey> {
    let binary = descriptor.binary.as_ref()?;
    let guid = row.guid(&binary.guid_column)?;
    let extension = row.text(&binary.extension_column).unwrap_or_default();
    Some(BlobKey::new(guid, extension))
}

/// Deletes a target row together with its children, bindings and file.
pub(crate) fn delete_row(
    engine: &mut Engine<'_>,
    descriptor: &ObjectTypeDescriptor,
    row: &Row,
) -> StagingResult<bool> {
    let Some(id) = row.id(&descriptor.id_column) else {
        return Ok(false);
    };
    for related in descriptor.children.iter().chain(&descriptor.bindings) {
        let related = engine.descriptor(related)?;
        let column = related.parent_column_for(&descriptor.object_type)?.to_string();
        let rows = engine
            .host
            .objects
            .find(&related, &Row::new().with(column, id))?;
        for child in rows {
            delete_row(engine, &related, &child)?;
        }
    }
    if !engine.host.objects.delete(descriptor, id)? {
        return Ok(false);
    }
    if let Some(key) = blob_key(descriptor, row) {
        engine.host.blobs.delete(&key)?;
    }
    engine.touch_object(&descriptor.object_type, id);
    engine.record_deleted(&descriptor.object_type, id);
    Ok(true)
}

/// Applies a `DeleteObject` task. Returns the deleted identifier, or `None`
/// when the object is not on the target.
pub(crate) fn delete_object_task(engine: &mut Engine<'_>) -> StagingResult<Option<i64>> {
    let task = engine.task;
    let descriptor = engine.descriptor(&task.object_type)?;
    if descriptor.is_site {
        return Err(StagingError::not_supported(format!(
            "deleting {} objects is not allowed",
            descriptor.object_type
        )));
    }
    let source_row = task.change_set.rows(&task.object_type).first().ok_or_else(|| {
        StagingError::structural(format!("table '{}' has no rows", task.object_type))
    })?;

    let mut row = source_row.clone();
    row.remove(&descriptor.id_column);
    // Unresolved scope columns only narrow the lookup; GUID still applies.
    engine.translate_columns(&descriptor, &mut row)?;
    let Some(existing) = engine.find_existing(&descriptor, &row)? else {
        debug!(object_type = %descriptor.object_type, "nothing to delete");
        return Ok(None);
    };
    let Some(id) = existing.id(&descriptor.id_column) else {
        return Ok(None);
    };
    let guid = descriptor
        .guid_column
        .as_ref()
        .and_then(|c| existing.guid(c));
    let site = descriptor
        .site_column
        .as_ref()
        .and_then(|c| existing.id(c));
    delete_row(engine, &descriptor, &existing)?;
    engine.log_replication(&descriptor.object_type, id, guid, site)?;
    Ok(Some(id))
}
