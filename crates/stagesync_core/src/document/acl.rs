//! Document access-control lists.
//!
//! A node either owns its list or inherits its parent's. Breaking
//! inheritance gives the node a list of its own; descendants that still
//! point at the old inherited list follow the new one.

use super::node::columns::*;
use super::node::{truthy, DocumentNode, ACL_ITEM_TYPE, ACL_TYPE, ROLE_TYPE, USER_TYPE};
use super::substate::delete_where;
use super::tree::{find_target, finish, required_node_id, SourceDocument};
use crate::engine::Engine;
use crate::error::{StagingError, StagingResult};
use crate::observer::AppliedObject;
use crate::sync::{delete_row, update_object, PostProcessEntry};
use crate::types::{SyncOutcome, TaskKind};
use stagesync_codec::{Row, Value};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};
use uuid::Uuid;

/// Applies the ACL carried by a create/update task.
///
/// Nothing happens while the source node inherits; restoring inheritance
/// is a task of its own.
pub(crate) fn reconcile(
    engine: &mut Engine<'_>,
    src: &SourceDocument,
    target: &DocumentNode,
) -> StagingResult<()> {
    let task = engine.task;
    let inherits = match task.change_set.parameter(PARAM_INHERITS_ACL) {
        Value::Null => !src.node.flag(NODE_IS_ACL_OWNER),
        value => truthy(value),
    };
    if inherits {
        return Ok(());
    }

    let acl_rows = task.change_set.rows(ACL_TYPE);
    let source_acl = acl_rows
        .iter()
        .find(|r| src.node_id.is_some() && r.id(ACL_OWNER_NODE_ID) == src.node_id)
        .or_else(|| acl_rows.first());
    let acl_id = ensure_own_acl(engine, target, source_acl.and_then(|r| r.guid(ACL_GUID)), None)?;
    if let Some(source_acl_id) = source_acl.and_then(|r| r.id(ACL_ID)) {
        reconcile_items(engine, source_acl_id, acl_id)?;
    }
    Ok(())
}

/// Makes `target` own an access-control list and returns its identifier.
///
/// When `copy_from` is given, the entries of that list are copied into the
/// new one.
pub(crate) fn ensure_own_acl(
    engine: &mut Engine<'_>,
    target: &DocumentNode,
    guid: Option<Uuid>,
    copy_from: Option<i64>,
) -> StagingResult<i64> {
    if target.is_acl_owner() {
        if let Some(acl_id) = target.acl_id() {
            return Ok(acl_id);
        }
    }
    let host = engine.host;
    let node_id = required_node_id(target)?;
    let descriptor = engine.descriptor(ACL_TYPE)?;
    let owned = host
        .objects
        .find(&descriptor, &Row::new().with(ACL_OWNER_NODE_ID, node_id))?
        .first()
        .and_then(|r| r.id(&descriptor.id_column));
    let acl_id = match owned {
        Some(id) => id,
        None => {
            let row = Row::new()
                .with(ACL_GUID, guid.unwrap_or_else(Uuid::new_v4))
                .with(ACL_OWNER_NODE_ID, node_id);
            let id = host.objects.insert(&descriptor, &row, None)?;
            engine.touch_object(ACL_TYPE, id);
            engine.record_applied(ACL_TYPE, id);
            id
        }
    };
    if let Some(from) = copy_from {
        copy_items(engine, from, acl_id)?;
    }

    let inherited = target.acl_id();
    let mut node = target.node.clone();
    node.set(NODE_ACL_ID, acl_id);
    node.set(NODE_IS_ACL_OWNER, true);
    host.documents.update(&DocumentNode::new(node, None))?;
    relink_descendants(engine, node_id, inherited, Some(acl_id))?;
    debug!(node_id, acl_id, "inheritance broken");
    Ok(acl_id)
}

/// Makes `target` inherit its parent's list again and drops its own.
pub(crate) fn restore_inheritance(
    engine: &mut Engine<'_>,
    target: &DocumentNode,
) -> StagingResult<()> {
    if !target.is_acl_owner() {
        return Ok(());
    }
    let host = engine.host;
    let node_id = required_node_id(target)?;
    let parent_acl = match target.parent_id() {
        Some(parent) => host.documents.node_by_id(parent, None)?.and_then(|n| n.acl_id()),
        None => None,
    };
    let own = target.acl_id();

    let mut node = target.node.clone();
    node.set(NODE_ACL_ID, parent_acl);
    node.set(NODE_IS_ACL_OWNER, false);
    host.documents.update(&DocumentNode::new(node, None))?;
    relink_descendants(engine, node_id, own, parent_acl)?;
    if let Some(own) = own {
        delete_acl(engine, own)?;
    }
    debug!(node_id, ?parent_acl, "inheritance restored");
    Ok(())
}

/// Descendants inheriting `old` switch to `new`. Owners and their
/// subtrees are left alone.
fn relink_descendants(
    engine: &Engine<'_>,
    node_id: i64,
    old: Option<i64>,
    new: Option<i64>,
) -> StagingResult<()> {
    let documents = &engine.host.documents;
    let mut pending = VecDeque::from([node_id]);
    while let Some(id) = pending.pop_front() {
        for child in documents.child_nodes(id)? {
            if child.is_acl_owner() {
                continue;
            }
            if child.acl_id() == old {
                let mut row = child.node.clone();
                row.set(NODE_ACL_ID, new);
                documents.update(&DocumentNode::new(row, None))?;
            }
            pending.extend(child.node_id());
        }
    }
    Ok(())
}

fn copy_items(engine: &mut Engine<'_>, from: i64, to: i64) -> StagingResult<()> {
    let descriptor = engine.descriptor(ACL_ITEM_TYPE)?;
    let host = engine.host;
    for item in host.objects.find(&descriptor, &Row::new().with(ACL_ID, from))? {
        let mut copy = item.clone();
        copy.remove(&descriptor.id_column);
        copy.set(ACL_ID, to);
        copy.set(ACL_ITEM_GUID, Uuid::new_v4());
        let id = host.objects.insert(&descriptor, &copy, None)?;
        engine.record_applied(ACL_ITEM_TYPE, id);
    }
    Ok(())
}

/// Deletes target entries absent from the source list, then upserts the
/// source entries with translated user and role references.
fn reconcile_items(
    engine: &mut Engine<'_>,
    source_acl: i64,
    target_acl: i64,
) -> StagingResult<()> {
    engine
        .translations
        .add_translation(ACL_TYPE, source_acl, target_acl, None);
    let descriptor = engine.descriptor(ACL_ITEM_TYPE)?;
    let task = engine.task;
    let incoming: Vec<(usize, &Row)> = task
        .change_set
        .rows(ACL_ITEM_TYPE)
        .iter()
        .enumerate()
        .filter(|(_, row)| row.id(ACL_ID) == Some(source_acl))
        .collect();
    let keep: HashSet<Uuid> = incoming
        .iter()
        .filter_map(|(_, row)| row.guid(ACL_ITEM_GUID))
        .collect();

    let existing = engine
        .host
        .objects
        .find(&descriptor, &Row::new().with(ACL_ID, target_acl))?;
    for row in existing {
        if !row.guid(ACL_ITEM_GUID).is_some_and(|g| keep.contains(&g)) {
            delete_row(engine, &descriptor, &row)?;
        }
    }
    for (index, row) in incoming {
        if let Some(column) = unresolved_principal(engine, row)? {
            warn!(
                guid = ?row.guid(ACL_ITEM_GUID),
                column,
                "access-control entry skipped, principal not on target"
            );
            continue;
        }
        if let SyncOutcome::Deferred(columns) = update_object(engine, &descriptor, row, false, 1)? {
            engine.post_queue.push(PostProcessEntry {
                object_type: ACL_ITEM_TYPE.to_string(),
                index,
                depth: 1,
                columns,
            });
        }
    }
    Ok(())
}

/// First principal column of an entry whose user or role has no target
/// counterpart. No default is substituted for a principal.
fn unresolved_principal(engine: &mut Engine<'_>, row: &Row) -> StagingResult<Option<&'static str>> {
    for (column, object_type) in [(ACL_ITEM_USER_ID, USER_TYPE), (ACL_ITEM_ROLE_ID, ROLE_TYPE)] {
        if let Some(source_id) = row.id(column) {
            if engine.resolve_id(object_type, source_id)?.is_none() {
                return Ok(Some(column));
            }
        }
    }
    Ok(None)
}

fn delete_acl(engine: &mut Engine<'_>, acl_id: i64) -> StagingResult<()> {
    let items = engine.descriptor(ACL_ITEM_TYPE)?;
    delete_where(engine, &items, ACL_ID, acl_id)?;
    let descriptor = engine.descriptor(ACL_TYPE)?;
    if let Some(row) = engine.host.objects.get(&descriptor, acl_id)? {
        delete_row(engine, &descriptor, &row)?;
    }
    Ok(())
}

/// Deletes the lists a node owns.
pub(crate) fn remove_owned(engine: &mut Engine<'_>, node_id: i64) -> StagingResult<()> {
    let descriptor = engine.descriptor(ACL_TYPE)?;
    let owned = engine
        .host
        .objects
        .find(&descriptor, &Row::new().with(ACL_OWNER_NODE_ID, node_id))?;
    for acl in owned {
        if let Some(id) = acl.id(&descriptor.id_column) {
            delete_acl(engine, id)?;
        }
    }
    Ok(())
}

/// Applies `BreakACLInheritance` and `RestoreACLInheritance`.
pub(crate) fn apply_inheritance_task(engine: &mut Engine<'_>) -> StagingResult<AppliedObject> {
    let src = SourceDocument::from_task(engine)?;
    let target = find_target(engine, &src, src.culture())?.ok_or_else(|| {
        StagingError::dependency_not_found(format!(
            "document '{}' does not exist on the target; synchronize it first",
            src.alias_path
        ))
    })?;
    let node_id = required_node_id(&target)?;

    if engine.kind() == TaskKind::BreakAclInheritance {
        let task = engine.task;
        let copy = truthy(task.change_set.parameter(PARAM_COPY_PERMISSIONS));
        let inherited = (!target.is_acl_owner()).then(|| target.acl_id()).flatten();
        let source_acl = task.change_set.rows(ACL_TYPE).first();
        let acl_id = ensure_own_acl(
            engine,
            &target,
            source_acl.and_then(|r| r.guid(ACL_GUID)),
            if copy { inherited } else { None },
        )?;
        if let Some(source_acl_id) = source_acl.and_then(|r| r.id(ACL_ID)) {
            reconcile_items(engine, source_acl_id, acl_id)?;
        }
    } else {
        restore_inheritance(engine, &target)?;
    }

    let refreshed = engine
        .host
        .documents
        .node_by_id(node_id, src.culture())?
        .ok_or_else(|| StagingError::host(format!("node {node_id} vanished")))?;
    engine.record_applied(&engine.task.object_type, node_id);
    finish(engine, &src, &refreshed)
}
