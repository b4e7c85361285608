//! In-memory document tree.

use crate::document::columns::*;
use crate::document::{child_path, DocumentNode};
use crate::error::{StagingError, StagingResult};
use crate::host::DocumentRepository;
use parking_lot::RwLock;
use stagesync_codec::{Row, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Default)]
struct TreeState {
    nodes: BTreeMap<i64, Row>,
    cultures: BTreeMap<i64, Row>,
}

impl TreeState {
    fn next_node_id(&self) -> i64 {
        self.nodes.keys().next_back().map_or(1, |id| id + 1)
    }

    fn next_document_id(&self) -> i64 {
        self.cultures.keys().next_back().map_or(1, |id| id + 1)
    }

    fn node(&self, node_id: i64) -> StagingResult<&Row> {
        self.nodes
            .get(&node_id)
            .ok_or_else(|| StagingError::host(format!("node {node_id} does not exist")))
    }

    fn culture_row(&self, node_id: i64, culture: &str) -> Option<&Row> {
        self.cultures.values().find(|c| {
            c.id(DOCUMENT_NODE_ID) == Some(node_id)
                && c.text(DOCUMENT_CULTURE)
                    .is_some_and(|code| code.eq_ignore_ascii_case(culture))
        })
    }

    fn view(&self, node_id: i64, culture: Option<&str>) -> Option<DocumentNode> {
        let node = self.nodes.get(&node_id)?.clone();
        // Links show the content of the node they point at.
        let content_id = node.id(NODE_LINKED_NODE_ID).unwrap_or(node_id);
        let culture = culture.and_then(|code| self.culture_row(content_id, code).cloned());
        Some(DocumentNode::new(node, culture))
    }

    fn children(&self, node_id: i64) -> Vec<i64> {
        let mut children: Vec<(i64, i64)> = self
            .nodes
            .values()
            .filter(|n| n.id(NODE_PARENT_ID) == Some(node_id))
            .filter_map(|n| Some((n.integer(NODE_ORDER).unwrap_or(0), n.id(NODE_ID)?)))
            .collect();
        children.sort_unstable();
        children.into_iter().map(|(_, id)| id).collect()
    }

    fn subtree(&self, node_id: i64) -> Vec<i64> {
        let mut out = vec![node_id];
        let mut i = 0;
        while i < out.len() {
            let children = self.children(out[i]);
            out.extend(children);
            i += 1;
        }
        out
    }

    fn refresh_paths(&mut self, node_id: i64) {
        for id in self.subtree(node_id) {
            let Some(parent_path) = self
                .nodes
                .get(&id)
                .and_then(|n| n.id(NODE_PARENT_ID))
                .and_then(|p| self.nodes.get(&p))
                .map(|p| p.text(NODE_ALIAS_PATH).unwrap_or("/").to_string())
            else {
                continue;
            };
            if let Some(node) = self.nodes.get_mut(&id) {
                let alias = node.text(NODE_ALIAS).unwrap_or_default().to_string();
                node.set(NODE_ALIAS_PATH, child_path(&parent_path, &alias));
            }
        }
    }

    /// Descendants still pointing at `old_acl` without owning it follow `new_acl`.
    fn propagate_acl(&mut self, node_id: i64, old_acl: Option<i64>, new_acl: Option<i64>) {
        for id in self.subtree(node_id) {
            if let Some(node) = self.nodes.get_mut(&id) {
                if !node.flag(NODE_IS_ACL_OWNER) && node.id(NODE_ACL_ID) == old_acl {
                    node.set(NODE_ACL_ID, new_acl);
                }
            }
        }
    }

    fn remove_subtree(&mut self, node_id: i64) -> bool {
        let ids = self.subtree(node_id);
        let removed = self.nodes.contains_key(&node_id);
        for id in &ids {
            self.nodes.remove(id);
        }
        self.cultures
            .retain(|_, c| c.id(DOCUMENT_NODE_ID).map_or(true, |n| !ids.contains(&n)));
        removed
    }

    fn prepare_child(&self, id: i64, parent_id: i64, node: &Row) -> StagingResult<Row> {
        let parent = self.node(parent_id)?;
        let mut row = node.clone();
        row.remove(NODE_LINKED_NODE_GUID);
        row.set(NODE_ID, id);
        row.set(NODE_PARENT_ID, parent_id);
        if row.id(NODE_SITE_ID).is_none() {
            row.set(NODE_SITE_ID, parent.get(NODE_SITE_ID).clone());
        }
        let alias = match row.text(NODE_ALIAS) {
            Some(alias) => alias.to_string(),
            None => row
                .text(NODE_ALIAS_PATH)
                .and_then(|p| p.rsplit('/').next())
                .filter(|s| !s.is_empty())
                .map_or_else(|| format!("node-{id}"), str::to_string),
        };
        let parent_path = parent.text(NODE_ALIAS_PATH).unwrap_or("/");
        row.set(NODE_ALIAS_PATH, child_path(parent_path, &alias));
        row.set(NODE_ALIAS, alias);
        if row.id(NODE_ACL_ID).is_none() || !row.flag(NODE_IS_ACL_OWNER) {
            row.set(NODE_ACL_ID, parent.get(NODE_ACL_ID).clone());
            row.set(NODE_IS_ACL_OWNER, false);
        }
        if row.integer(NODE_ORDER).is_none() {
            let next = self
                .children(parent_id)
                .iter()
                .filter_map(|c| self.nodes.get(c)?.integer(NODE_ORDER))
                .max()
                .map_or(1, |max| max + 1);
            row.set(NODE_ORDER, next);
        }
        Ok(row)
    }

    fn add_culture(&mut self, node_id: i64, culture: &Row) -> i64 {
        let document_id = self.next_document_id();
        let mut row = culture.clone();
        row.set(DOCUMENT_ID, document_id);
        row.set(DOCUMENT_NODE_ID, node_id);
        self.cultures.insert(document_id, row);
        document_id
    }
}

/// Document tree held in memory.
///
/// Alias paths are derived from `NodeAlias` and the parent path, and are
/// refreshed for the whole subtree on move or rename. Nodes that do not own
/// their access-control list follow their parent's list.
#[derive(Debug, Default)]
pub struct MemoryDocumentRepository {
    state: RwLock<TreeState>,
}

impl MemoryDocumentRepository {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the root node of a site.
    pub fn create_root(&self, site_id: Option<i64>) -> DocumentNode {
        let mut state = self.state.write();
        let id = state.next_node_id();
        let row = Row::new()
            .with(NODE_ID, id)
            .with(NODE_GUID, Uuid::new_v4())
            .with(NODE_ALIAS_PATH, "/")
            .with(NODE_ALIAS, "")
            .with(CLASS_NAME, "cms.root")
            .with(NODE_SITE_ID, site_id)
            .with(NODE_ORDER, 1);
        state.nodes.insert(id, row.clone());
        DocumentNode::new(row, None)
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Number of culture versions.
    pub fn culture_count(&self) -> usize {
        self.state.read().cultures.len()
    }
}

fn site_matches(node: &Row, site_id: Option<i64>) -> bool {
    site_id.map_or(true, |site| node.id(NODE_SITE_ID) == Some(site))
}

impl DocumentRepository for MemoryDocumentRepository {
    fn root(&self, site_id: Option<i64>) -> StagingResult<Option<DocumentNode>> {
        let state = self.state.read();
        Ok(state
            .nodes
            .values()
            .find(|n| n.id(NODE_PARENT_ID).is_none() && site_matches(n, site_id))
            .and_then(|n| n.id(NODE_ID))
            .and_then(|id| state.view(id, None)))
    }

    fn node_by_guid(
        &self,
        site_id: Option<i64>,
        guid: Uuid,
        culture: Option<&str>,
    ) -> StagingResult<Option<DocumentNode>> {
        let state = self.state.read();
        Ok(state
            .nodes
            .values()
            .find(|n| n.guid(NODE_GUID) == Some(guid) && site_matches(n, site_id))
            .and_then(|n| n.id(NODE_ID))
            .and_then(|id| state.view(id, culture)))
    }

    fn node_by_alias_path(
        &self,
        site_id: Option<i64>,
        alias_path: &str,
        culture: Option<&str>,
    ) -> StagingResult<Option<DocumentNode>> {
        let state = self.state.read();
        Ok(state
            .nodes
            .values()
            .find(|n| {
                n.text(NODE_ALIAS_PATH)
                    .is_some_and(|p| p.eq_ignore_ascii_case(alias_path))
                    && site_matches(n, site_id)
            })
            .and_then(|n| n.id(NODE_ID))
            .and_then(|id| state.view(id, culture)))
    }

    fn node_by_id(&self, node_id: i64, culture: Option<&str>) -> StagingResult<Option<DocumentNode>> {
        Ok(self.state.read().view(node_id, culture))
    }

    fn cultures(&self, node_id: i64) -> StagingResult<Vec<String>> {
        let state = self.state.read();
        let content_id = state
            .nodes
            .get(&node_id)
            .and_then(|n| n.id(NODE_LINKED_NODE_ID))
            .unwrap_or(node_id);
        Ok(state
            .cultures
            .values()
            .filter(|c| c.id(DOCUMENT_NODE_ID) == Some(content_id))
            .filter_map(|c| c.text(DOCUMENT_CULTURE).map(str::to_string))
            .collect())
    }

    fn child_nodes(&self, node_id: i64) -> StagingResult<Vec<DocumentNode>> {
        let state = self.state.read();
        Ok(state
            .children(node_id)
            .into_iter()
            .filter_map(|id| state.view(id, None))
            .collect())
    }

    fn insert_node(&self, parent_id: i64, node: &Row, culture: &Row) -> StagingResult<DocumentNode> {
        let mut state = self.state.write();
        let id = state.next_node_id();
        let row = state.prepare_child(id, parent_id, node)?;
        state.nodes.insert(id, row);
        let code = culture.text(DOCUMENT_CULTURE).map(str::to_string);
        state.add_culture(id, culture);
        state
            .view(id, code.as_deref())
            .ok_or_else(|| StagingError::host("inserted node vanished"))
    }

    fn insert_culture(&self, node_id: i64, culture: &Row) -> StagingResult<DocumentNode> {
        let mut state = self.state.write();
        state.node(node_id)?;
        let code = culture.text(DOCUMENT_CULTURE).map(str::to_string);
        if let Some(code) = &code {
            if state.culture_row(node_id, code).is_some() {
                return Err(StagingError::host(format!(
                    "node {node_id} already has culture {code}"
                )));
            }
        }
        state.add_culture(node_id, culture);
        state
            .view(node_id, code.as_deref())
            .ok_or_else(|| StagingError::host("node vanished"))
    }

    fn insert_link(&self, parent_id: i64, linked_node_id: i64, node: &Row) -> StagingResult<DocumentNode> {
        let mut state = self.state.write();
        state.node(linked_node_id)?;
        let id = state.next_node_id();
        let mut row = state.prepare_child(id, parent_id, node)?;
        row.set(NODE_LINKED_NODE_ID, linked_node_id);
        state.nodes.insert(id, row);
        state
            .view(id, None)
            .ok_or_else(|| StagingError::host("inserted link vanished"))
    }

    fn update(&self, document: &DocumentNode) -> StagingResult<()> {
        let node_id = document
            .node_id()
            .ok_or_else(|| StagingError::host("document update without node identifier"))?;
        let mut state = self.state.write();
        let previous = state.node(node_id)?.clone();
        let mut row = document.node.clone();
        row.set(NODE_ID, node_id);
        row.remove(NODE_LINKED_NODE_GUID);
        let renamed = previous.get(NODE_ALIAS) != row.get(NODE_ALIAS)
            || previous.get(NODE_ALIAS_PATH) != row.get(NODE_ALIAS_PATH);
        state.nodes.insert(node_id, row);
        if renamed && previous.id(NODE_PARENT_ID).is_some() {
            state.refresh_paths(node_id);
        }

        if let Some(culture) = &document.culture {
            let document_id = culture
                .id(DOCUMENT_ID)
                .ok_or_else(|| StagingError::host("culture update without document identifier"))?;
            if !state.cultures.contains_key(&document_id) {
                return Err(StagingError::host(format!("document {document_id} does not exist")));
            }
            state.cultures.insert(document_id, culture.clone());
        }
        Ok(())
    }

    fn move_node(&self, node_id: i64, new_parent_id: i64) -> StagingResult<DocumentNode> {
        let mut state = self.state.write();
        let new_parent_acl = state.node(new_parent_id)?.id(NODE_ACL_ID);
        if state.subtree(node_id).contains(&new_parent_id) {
            return Err(StagingError::host(format!(
                "cannot move node {node_id} under its own descendant {new_parent_id}"
            )));
        }
        let node = state
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| StagingError::host(format!("node {node_id} does not exist")))?;
        node.set(NODE_PARENT_ID, new_parent_id);
        let inherits = !node.flag(NODE_IS_ACL_OWNER);
        let old_acl = node.id(NODE_ACL_ID);
        state.refresh_paths(node_id);
        if inherits {
            state.propagate_acl(node_id, old_acl, new_parent_acl);
        }
        state
            .view(node_id, None)
            .ok_or_else(|| StagingError::host("moved node vanished"))
    }

    fn delete_culture(&self, node_id: i64, culture: &str) -> StagingResult<bool> {
        let mut state = self.state.write();
        let before = state.cultures.len();
        state.cultures.retain(|_, c| {
            !(c.id(DOCUMENT_NODE_ID) == Some(node_id)
                && c.text(DOCUMENT_CULTURE)
                    .is_some_and(|code| code.eq_ignore_ascii_case(culture)))
        });
        let removed = state.cultures.len() != before;
        let remaining = state
            .cultures
            .values()
            .any(|c| c.id(DOCUMENT_NODE_ID) == Some(node_id));
        if removed && !remaining {
            state.remove_subtree(node_id);
        }
        Ok(removed)
    }

    fn delete_node(&self, node_id: i64) -> StagingResult<bool> {
        Ok(self.state.write().remove_subtree(node_id))
    }
}

impl MemoryDocumentRepository {
    /// Sets a node column directly, bypassing path and ACL maintenance.
    pub fn set_node_column(&self, node_id: i64, column: &str, value: impl Into<Value>) {
        if let Some(node) = self.state.write().nodes.get_mut(&node_id) {
            node.set(column, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(alias: &str) -> Row {
        Row::new()
            .with(NODE_GUID, Uuid::new_v4())
            .with(NODE_ALIAS, alias)
            .with(CLASS_NAME, "cms.page")
    }

    fn culture(code: &str) -> Row {
        Row::new().with(DOCUMENT_CULTURE, code).with(DOCUMENT_NAME, code)
    }

    #[test]
    fn insert_builds_alias_paths() {
        let repo = MemoryDocumentRepository::new();
        let root = repo.create_root(Some(1)).node_id().unwrap();
        let articles = repo.insert_node(root, &page("Articles"), &culture("en-us")).unwrap();
        let foo = repo
            .insert_node(articles.node_id().unwrap(), &page("Foo"), &culture("en-us"))
            .unwrap();
        assert_eq!(foo.alias_path(), "/Articles/Foo");
        assert_eq!(foo.site_id(), Some(1));
        assert_eq!(foo.culture_code(), Some("en-us"));
        assert!(repo
            .node_by_alias_path(Some(1), "/articles/foo", Some("en-us"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn move_refreshes_subtree_paths_and_acl() {
        let repo = MemoryDocumentRepository::new();
        let root = repo.create_root(None).node_id().unwrap();
        let a = repo.insert_node(root, &page("A"), &culture("en-us")).unwrap();
        let b = repo.insert_node(root, &page("B"), &culture("en-us")).unwrap();
        let a_id = a.node_id().unwrap();
        let b_id = b.node_id().unwrap();
        let child = repo.insert_node(a_id, &page("C"), &culture("en-us")).unwrap();

        repo.set_node_column(b_id, NODE_ACL_ID, 7);
        repo.set_node_column(b_id, NODE_IS_ACL_OWNER, true);

        repo.move_node(a_id, b_id).unwrap();
        let moved = repo.node_by_id(child.node_id().unwrap(), None).unwrap().unwrap();
        assert_eq!(moved.alias_path(), "/B/A/C");
        assert_eq!(moved.acl_id(), Some(7));
        assert!(repo.move_node(b_id, a_id).is_err());
    }

    #[test]
    fn last_culture_removes_node() {
        let repo = MemoryDocumentRepository::new();
        let root = repo.create_root(None).node_id().unwrap();
        let node = repo.insert_node(root, &page("A"), &culture("en-us")).unwrap();
        let id = node.node_id().unwrap();
        repo.insert_culture(id, &culture("de-de")).unwrap();
        assert!(repo.insert_culture(id, &culture("de-de")).is_err());

        assert!(repo.delete_culture(id, "en-us").unwrap());
        assert!(repo.node_by_id(id, None).unwrap().is_some());
        assert!(repo.delete_culture(id, "de-de").unwrap());
        assert!(repo.node_by_id(id, None).unwrap().is_none());
        assert_eq!(repo.culture_count(), 0);
    }

    #[test]
    fn links_show_target_content() {
        let repo = MemoryDocumentRepository::new();
        let root = repo.create_root(None).node_id().unwrap();
        let original = repo.insert_node(root, &page("A"), &culture("en-us")).unwrap();
        let link = repo
            .insert_link(root, original.node_id().unwrap(), &page("LinkToA"))
            .unwrap();
        let loaded = repo
            .node_by_id(link.node_id().unwrap(), Some("en-us"))
            .unwrap()
            .unwrap();
        assert!(loaded.is_link());
        assert_eq!(loaded.document_id(), original.document_id());
    }
}
