//! Document tree operations: create, update, move and delete.

use super::node::columns::*;
use super::node::{
    parent_path, split_document_row, truthy, DocumentNode, DOCUMENT_TYPE, NODE_TYPE,
    PAGE_TEMPLATE_TYPE, USER_TYPE,
};
use super::{acl, substate, workflow};
use crate::engine::Engine;
use crate::error::{StagingError, StagingResult};
use crate::observer::AppliedObject;
use crate::types::TaskKind;
use stagesync_codec::{Row, Value};
use std::collections::VecDeque;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Node columns that only make sense on the source.
const NODE_SOURCE_ONLY: &[&str] = &[
    NODE_ID,
    NODE_PARENT_ID,
    NODE_PARENT_GUID,
    NODE_ACL_ID,
    NODE_IS_ACL_OWNER,
    NODE_LINKED_NODE_ID,
    NODE_SITE_ID,
];

/// Node columns the target maintains itself; an update never writes them.
const NODE_TARGET_OWNED: &[&str] = &[
    NODE_ID,
    NODE_PARENT_ID,
    NODE_ALIAS_PATH,
    NODE_ACL_ID,
    NODE_IS_ACL_OWNER,
    NODE_SITE_ID,
    NODE_LINKED_NODE_ID,
    NODE_LINKED_NODE_GUID,
];

/// Culture columns that only make sense on the source.
const CULTURE_SOURCE_ONLY: &[&str] = &[
    DOCUMENT_ID,
    DOCUMENT_NODE_ID,
    DOCUMENT_PUBLISHED_VERSION,
    DOCUMENT_CHECKED_OUT_VERSION,
    DOCUMENT_WORKFLOW_STEP_ID,
];

const NODE_REFERENCES: &[(&str, &str)] = &[(NODE_OWNER, USER_TYPE)];

const CULTURE_REFERENCES: &[(&str, &str)] = &[
    (DOCUMENT_MODIFIED_BY, USER_TYPE),
    (DOCUMENT_PAGE_TEMPLATE_ID, PAGE_TEMPLATE_TYPE),
];

/// The incoming document row, split into node and culture parts.
#[derive(Debug, Clone)]
pub(crate) struct SourceDocument {
    pub node: Row,
    pub culture: Row,
    pub guid: Uuid,
    pub node_id: Option<i64>,
    pub document_id: Option<i64>,
    pub culture_code: Option<String>,
    pub alias_path: String,
    pub linked_guid: Option<Uuid>,
}

impl SourceDocument {
    pub fn from_task(engine: &Engine<'_>) -> StagingResult<Self> {
        let row = engine
            .task
            .change_set
            .rows(DOCUMENT_TYPE)
            .first()
            .ok_or_else(|| StagingError::structural("document table has no rows"))?;
        let (node, culture) = split_document_row(row);
        let guid = node
            .guid(NODE_GUID)
            .ok_or_else(|| StagingError::structural(format!("document row has no {NODE_GUID}")))?;
        Ok(Self {
            node_id: node.id(NODE_ID),
            document_id: culture.id(DOCUMENT_ID),
            culture_code: culture.text(DOCUMENT_CULTURE).map(str::to_string),
            alias_path: node.text(NODE_ALIAS_PATH).unwrap_or("/").to_string(),
            linked_guid: node.guid(NODE_LINKED_NODE_GUID),
            guid,
            node,
            culture,
        })
    }

    pub fn culture(&self) -> Option<&str> {
        self.culture_code.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.alias_path == "/"
    }

    pub fn is_link(&self) -> bool {
        self.linked_guid.is_some()
    }

    fn parent_guid(&self, engine: &Engine<'_>) -> Option<Uuid> {
        self.node
            .guid(NODE_PARENT_GUID)
            .or_else(|| engine.task.change_set.parameter(NODE_PARENT_GUID).as_guid())
    }

    /// Whether the source version was published when the task was logged.
    pub fn is_published(&self, engine: &Engine<'_>) -> bool {
        truthy(engine.task.change_set.parameter(PARAM_IS_PUBLISHED))
            || self.culture.flag(DOCUMENT_IS_PUBLISHED)
    }
}

/// Applies `CreateDocument` and `UpdateDocument` (and the version-less
/// fallback of `PublishDocument`).
#[instrument(level = "debug", skip_all, fields(class = %engine.task.object_type))]
pub(crate) fn create_or_update(engine: &mut Engine<'_>) -> StagingResult<AppliedObject> {
    let src = SourceDocument::from_task(engine)?;
    let target = apply_document(engine, &src)?;

    let has_workflow = truthy(engine.task.change_set.parameter(PARAM_HAS_WORKFLOW));
    if has_workflow && engine.kind() != TaskKind::PublishDocument {
        let published = src.is_published(engine);
        workflow::auto_advance(engine, &target, published)?;
    }
    finish(engine, &src, &target)
}

/// Writes the node, its culture version and its sub-state. Returns the
/// target document with the source culture loaded.
pub(crate) fn apply_document(
    engine: &mut Engine<'_>,
    src: &SourceDocument,
) -> StagingResult<DocumentNode> {
    let reconcile_substate = engine.options.process_children && !src.is_link();
    if reconcile_substate {
        substate::apply_page_templates(engine)?;
    }

    let mut node_row = without(&src.node, NODE_SOURCE_ONLY);
    translate_references(engine, &mut node_row, NODE_REFERENCES)?;
    let mut culture_row = without(&src.culture, CULTURE_SOURCE_ONLY);
    translate_references(engine, &mut culture_row, CULTURE_REFERENCES)?;

    let target = match find_target(engine, src, src.culture())? {
        Some(existing) if existing.culture.is_some() || existing.is_link() || src.culture().is_none() => {
            update_existing(engine, &existing, &node_row, &culture_row)?
        }
        Some(existing) => {
            let node_id = required_node_id(&existing)?;
            debug!(node_id, culture = ?src.culture(), "new culture version");
            let created = engine.host.documents.insert_culture(node_id, &culture_row)?;
            update_existing(engine, &created, &node_row, &culture_row)?
        }
        None => insert(engine, src, node_row, &culture_row)?,
    };

    record_translations(engine, src, &target);
    engine.record_applied(&engine.task.object_type, required_node_id(&target)?);

    if reconcile_substate && !target.is_link() {
        substate::reconcile(engine, src, &target)?;
    }
    acl::reconcile(engine, src, &target)?;
    Ok(target)
}

fn insert(
    engine: &Engine<'_>,
    src: &SourceDocument,
    mut node_row: Row,
    culture_row: &Row,
) -> StagingResult<DocumentNode> {
    if src.is_root() {
        return Err(StagingError::dependency_not_found(
            "the target site has no root document",
        ));
    }
    let documents = &engine.host.documents;
    let parent = find_parent(engine, src)?;
    let parent_id = required_node_id(&parent)?;
    if let Some(site_id) = engine.site_id {
        node_row.set(NODE_SITE_ID, site_id);
    }

    let Some(linked_guid) = src.linked_guid else {
        debug!(parent_id, path = %src.alias_path, "inserting document");
        return documents.insert_node(parent_id, &node_row, culture_row);
    };
    let linked = documents
        .node_by_guid(None, linked_guid, None)?
        .ok_or_else(|| {
            StagingError::dependency_not_found(format!(
                "document {linked_guid} linked from '{}' does not exist on the target; \
                 synchronize it first",
                src.alias_path
            ))
        })?;
    debug!(parent_id, path = %src.alias_path, "inserting link");
    let link = documents.insert_link(parent_id, required_node_id(&linked)?, &node_row)?;
    let link_id = required_node_id(&link)?;
    Ok(documents.node_by_id(link_id, src.culture())?.unwrap_or(link))
}

fn update_existing(
    engine: &Engine<'_>,
    existing: &DocumentNode,
    node_row: &Row,
    culture_row: &Row,
) -> StagingResult<DocumentNode> {
    let node_id = required_node_id(existing)?;
    let mut node = existing.node.clone();
    for (column, value) in node_row.iter() {
        if !NODE_TARGET_OWNED.contains(&column.as_str()) {
            node.set(column.clone(), value.clone());
        }
    }
    // A link shows the content of another node; only its node row is ours.
    let culture = if existing.is_link() {
        None
    } else {
        existing.culture.clone().map(|mut culture| {
            for (column, value) in culture_row.iter() {
                culture.set(column.clone(), value.clone());
            }
            culture
        })
    };
    let code = existing.culture_code().map(str::to_string);
    let documents = &engine.host.documents;
    documents.update(&DocumentNode::new(node, culture))?;
    documents
        .node_by_id(node_id, code.as_deref())?
        .ok_or_else(|| StagingError::host(format!("node {node_id} vanished during update")))
}

/// The target document for a source document: the site root for `/`, the
/// node with the same GUID otherwise.
pub(crate) fn find_target(
    engine: &Engine<'_>,
    src: &SourceDocument,
    culture: Option<&str>,
) -> StagingResult<Option<DocumentNode>> {
    let documents = &engine.host.documents;
    if !src.is_root() {
        return documents.node_by_guid(engine.site_id, src.guid, culture);
    }
    match documents.root(engine.site_id)?.and_then(|r| r.node_id()) {
        Some(root_id) => documents.node_by_id(root_id, culture),
        None => Ok(None),
    }
}

/// Locates the parent by alias path, then by the parent GUID in case the
/// parent was moved on the target.
fn find_parent(engine: &Engine<'_>, src: &SourceDocument) -> StagingResult<DocumentNode> {
    let documents = &engine.host.documents;
    let path = parent_path(&src.alias_path).unwrap_or("/");
    if let Some(parent) = documents.node_by_alias_path(engine.site_id, path, None)? {
        return Ok(parent);
    }
    if let Some(guid) = src.parent_guid(engine) {
        if let Some(parent) = documents.node_by_guid(engine.site_id, guid, None)? {
            debug!(%guid, path, "parent found by GUID");
            return Ok(parent);
        }
    }
    Err(StagingError::dependency_not_found(format!(
        "parent document '{path}' of '{}' does not exist on the target; \
         synchronize the parent document first",
        src.alias_path
    )))
}

/// Applies a `MoveDocument` task.
///
/// The destination must exist before anything is changed.
pub(crate) fn move_document(engine: &mut Engine<'_>) -> StagingResult<AppliedObject> {
    let src = SourceDocument::from_task(engine)?;
    let documents = &engine.host.documents;
    let node = documents
        .node_by_guid(engine.site_id, src.guid, None)?
        .ok_or_else(|| {
            StagingError::dependency_not_found(format!(
                "document '{}' does not exist on the target; synchronize it before moving it",
                src.alias_path
            ))
        })?;
    let parent = find_parent(engine, &src)?;
    let node_id = required_node_id(&node)?;
    let parent_id = required_node_id(&parent)?;

    let inherited_acl = (!node.is_acl_owner()).then(|| node.acl_id()).flatten();
    if node.parent_id() != Some(parent_id) {
        debug!(node_id, parent_id, "moving document");
        documents.move_node(node_id, parent_id)?;
    }
    let mut moved = documents
        .node_by_id(node_id, src.culture())?
        .ok_or_else(|| StagingError::host(format!("node {node_id} vanished during move")))?;
    if let Some(alias) = src.node.text(NODE_ALIAS) {
        if moved.node.text(NODE_ALIAS) != Some(alias) {
            moved.node.set(NODE_ALIAS, alias);
            documents.update(&DocumentNode::new(moved.node.clone(), None))?;
            moved = documents
                .node_by_id(node_id, src.culture())?
                .ok_or_else(|| StagingError::host(format!("node {node_id} vanished")))?;
        }
    }

    // Keep the permissions the node had at its old location.
    if truthy(engine.task.change_set.parameter(PARAM_COPY_PERMISSIONS)) {
        if let Some(old_acl) = inherited_acl {
            acl::ensure_own_acl(engine, &moved, None, Some(old_acl))?;
        }
    }
    record_translations(engine, &src, &moved);
    engine.record_applied(&engine.task.object_type, node_id);
    finish(engine, &src, &moved)
}

/// Applies `DeleteDocument` (one culture) and `DeleteAllCultures`.
///
/// Removing the last culture removes the node and its subtree. A document
/// that is not on the target is a no-op.
pub(crate) fn delete_document(engine: &mut Engine<'_>, all_cultures: bool) -> StagingResult<()> {
    let src = SourceDocument::from_task(engine)?;
    if src.is_root() {
        return Err(StagingError::not_supported("the root document cannot be deleted"));
    }
    let host = engine.host;
    let Some(node) = host.documents.node_by_guid(engine.site_id, src.guid, None)? else {
        debug!(guid = %src.guid, "document not on target; nothing to delete");
        return Ok(());
    };
    let node_id = required_node_id(&node)?;
    let cultures = host.documents.cultures(node_id)?;
    let removing: Vec<String> = match src.culture() {
        Some(code) if !all_cultures && !node.is_link() => cultures
            .iter()
            .filter(|c| c.eq_ignore_ascii_case(code))
            .cloned()
            .collect(),
        _ => cultures.clone(),
    };
    if removing.is_empty() && !node.is_link() {
        debug!(node_id, culture = ?src.culture(), "culture not on target; nothing to delete");
        return Ok(());
    }

    if node.is_link() || removing.len() == cultures.len() {
        let subtree = subtree_of(engine, node_id)?;
        let document_ids = document_ids_of(engine, &subtree)?;
        substate::remove_document_state(engine, &document_ids, &subtree)?;
        host.documents.delete_node(node_id)?;
    } else {
        for code in &removing {
            if let Some(document_id) = host
                .documents
                .node_by_id(node_id, Some(code))?
                .and_then(|d| d.document_id())
            {
                substate::remove_document_state(engine, &[document_id], &[])?;
            }
            host.documents.delete_culture(node_id, code)?;
        }
    }

    if node.is_link() {
        host.cache.invalidate_search(node_id, None);
    }
    for code in &removing {
        host.cache.invalidate_search(node_id, Some(code));
    }
    engine.record_deleted(&engine.task.object_type, node_id);
    engine.touch_node(Some(src.guid), None);
    engine.log_replication(&engine.task.object_type, node_id, Some(src.guid), node.site_id())
}

/// Node identifiers of a subtree, root first.
fn subtree_of(engine: &Engine<'_>, node_id: i64) -> StagingResult<Vec<i64>> {
    let mut ids = Vec::new();
    let mut pending = VecDeque::from([node_id]);
    while let Some(id) = pending.pop_front() {
        ids.push(id);
        for child in engine.host.documents.child_nodes(id)? {
            pending.extend(child.node_id());
        }
    }
    Ok(ids)
}

/// Culture version identifiers held by the given nodes (links hold none).
fn document_ids_of(engine: &Engine<'_>, node_ids: &[i64]) -> StagingResult<Vec<i64>> {
    let documents = &engine.host.documents;
    let mut ids = Vec::new();
    for &node_id in node_ids {
        for code in documents.cultures(node_id)? {
            if let Some(document) = documents.node_by_id(node_id, Some(&code))? {
                if !document.is_link() {
                    ids.extend(document.document_id());
                }
            }
        }
    }
    Ok(ids)
}

/// Records node and culture translations for a written document.
pub(crate) fn record_translations(
    engine: &mut Engine<'_>,
    src: &SourceDocument,
    target: &DocumentNode,
) {
    if let (Some(source), Some(target)) = (src.node_id, target.node_id()) {
        engine
            .translations
            .add_translation(NODE_TYPE, source, target, None);
    }
    if let (Some(source), Some(target)) = (src.document_id, target.document_id()) {
        engine
            .translations
            .add_translation(DOCUMENT_TYPE, source, target, None);
    }
}

/// Cache, replication log and result for a written document.
pub(crate) fn finish(
    engine: &Engine<'_>,
    src: &SourceDocument,
    target: &DocumentNode,
) -> StagingResult<AppliedObject> {
    let node_id = required_node_id(target)?;
    engine.touch_node(target.guid(), target.document_id());
    engine.log_replication(&engine.task.object_type, node_id, target.guid(), target.site_id())?;
    Ok(AppliedObject {
        object_type: engine.task.object_type.clone(),
        target_id: node_id,
        guid: target.guid(),
        culture: target
            .culture_code()
            .or(src.culture())
            .map(str::to_string),
    })
}

pub(crate) fn required_node_id(document: &DocumentNode) -> StagingResult<i64> {
    document
        .node_id()
        .ok_or_else(|| StagingError::host("document without node identifier"))
}

fn without(row: &Row, columns: &[&str]) -> Row {
    row.iter()
        .filter(|(column, _)| !columns.contains(&column.as_str()))
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect()
}

/// Rewrites reference columns through the translation table; unresolved
/// references are cleared.
fn translate_references(
    engine: &mut Engine<'_>,
    row: &mut Row,
    references: &[(&str, &str)],
) -> StagingResult<()> {
    for (column, object_type) in references {
        let Some(source_id) = row.id(column) else {
            continue;
        };
        match engine.translate_id(object_type, source_id)? {
            Some(target_id) => row.set(*column, target_id),
            None => row.set(*column, Value::Null),
        }
    }
    Ok(())
}
