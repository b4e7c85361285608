//! Site bindings: an object being visible on a site.

use super::object::update_object;
use super::post_process::PostProcessEntry;
use super::reconcile::ParentScope;
use crate::document::PARAM_SITE_NAME;
use crate::engine::{site_id_by_name, Engine};
use crate::error::{StagingError, StagingResult};
use crate::object::ObjectTypeDescriptor;
use crate::observer::AppliedObject;
use crate::types::SyncOutcome;
use stagesync_codec::Row;
use std::sync::Arc;
use tracing::debug;

/// Upserts the incoming site-binding rows of a parent. Site bindings are
/// never removed by reconciliation; only `RemoveFromSite` removes them.
pub(crate) fn apply_site_bindings(
    engine: &mut Engine<'_>,
    scope: &ParentScope<'_>,
    binding: &Arc<ObjectTypeDescriptor>,
    parent_column: &str,
) -> StagingResult<()> {
    let task = engine.task;
    for (index, row) in task.change_set.rows(&binding.object_type).iter().enumerate() {
        if row.id(parent_column) != Some(scope.source_id) {
            continue;
        }
        if let SyncOutcome::Deferred(columns) =
            update_object(engine, binding, row, false, scope.depth + 1)?
        {
            engine.post_queue.push(PostProcessEntry {
                object_type: binding.object_type.clone(),
                index,
                depth: scope.depth + 1,
                columns,
            });
        }
    }
    Ok(())
}

/// Applies an `AddToSite` task: upserts the object, then binds it to the
/// site named by the task (or the configured target site).
pub(crate) fn add_to_site(engine: &mut Engine<'_>) -> StagingResult<Option<AppliedObject>> {
    let task = engine.task;
    let descriptor = engine.descriptor(&task.object_type)?;
    let bindings = site_bindings(engine, &descriptor)?;
    let site_id = requested_site(engine)?;

    let Some(applied) = super::apply_object_task(engine)? else {
        return Ok(None);
    };
    for binding in &bindings {
        let criteria = binding_criteria(engine, &descriptor, binding, applied.target_id, site_id)?;
        if !engine.host.objects.find(binding, &criteria)?.is_empty() {
            debug!(binding = %binding.object_type, site_id, "already bound");
            continue;
        }
        let id = engine.host.objects.insert(binding, &criteria, None)?;
        engine.touch_object(&binding.object_type, id);
        engine.record_applied(&binding.object_type, id);
    }
    Ok(Some(applied))
}

/// Applies a `RemoveFromSite` task. Returns `Skipped` when the object is not
/// on the target.
pub(crate) fn remove_from_site(engine: &mut Engine<'_>) -> StagingResult<SyncOutcome> {
    let task = engine.task;
    let descriptor = engine.descriptor(&task.object_type)?;
    let bindings = site_bindings(engine, &descriptor)?;
    let site_id = requested_site(engine)?;

    let source_row = task.change_set.rows(&task.object_type).first().ok_or_else(|| {
        StagingError::structural(format!("table '{}' has no rows", task.object_type))
    })?;
    let mut row = source_row.clone();
    row.remove(&descriptor.id_column);
    engine.translate_columns(&descriptor, &mut row)?;
    let Some(target_id) = engine
        .find_existing(&descriptor, &row)?
        .and_then(|r| r.id(&descriptor.id_column))
    else {
        debug!(object_type = %descriptor.object_type, "not on target; nothing to unbind");
        return Ok(SyncOutcome::Skipped);
    };

    for binding in &bindings {
        let criteria = binding_criteria(engine, &descriptor, binding, target_id, site_id)?;
        for bound in engine.host.objects.find(binding, &criteria)? {
            let Some(id) = bound.id(&binding.id_column) else {
                continue;
            };
            if engine.host.objects.delete(binding, id)? {
                engine.touch_object(&binding.object_type, id);
                engine.record_deleted(&binding.object_type, id);
            }
        }
    }
    let guid = descriptor.guid_column.as_ref().and_then(|c| row.guid(c));
    engine.log_replication(&descriptor.object_type, target_id, guid, Some(site_id))?;
    Ok(SyncOutcome::Applied(target_id))
}

fn site_bindings(
    engine: &Engine<'_>,
    descriptor: &ObjectTypeDescriptor,
) -> StagingResult<Vec<Arc<ObjectTypeDescriptor>>> {
    let bindings = engine.host.registry.site_bindings_of(&descriptor.object_type);
    if bindings.is_empty() {
        return Err(StagingError::not_supported(format!(
            "{} cannot be bound to sites",
            descriptor.object_type
        )));
    }
    Ok(bindings)
}

/// The site a binding task targets: the task's site name parameter, else the
/// configured target site.
fn requested_site(engine: &Engine<'_>) -> StagingResult<i64> {
    let task = engine.task;
    if let Some(name) = task.change_set.parameter(PARAM_SITE_NAME).as_text() {
        return site_id_by_name(engine.host, name)?.ok_or_else(|| {
            StagingError::dependency_not_found(format!(
                "site '{name}' does not exist on the target; synchronize it first"
            ))
        });
    }
    engine
        .site_id
        .ok_or_else(|| StagingError::structural("site binding task names no site"))
}

fn binding_criteria(
    engine: &Engine<'_>,
    descriptor: &ObjectTypeDescriptor,
    binding: &ObjectTypeDescriptor,
    target_id: i64,
    site_id: i64,
) -> StagingResult<Row> {
    let object_column = binding.parent_column_for(&descriptor.object_type)?;
    let site_column = match &binding.site_column {
        Some(column) => column.as_str(),
        None => {
            let site_type = engine
                .host
                .registry
                .site_type()
                .map(|s| s.object_type.as_str())
                .unwrap_or_default();
            binding.parent_column_for(site_type)?
        }
    };
    Ok(Row::new()
        .with(object_column, target_id)
        .with(site_column, site_id))
}
