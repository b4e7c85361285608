//! Change-set and task builders.

use crate::fixtures::types::{TAG, TAG_GROUP};
use crate::fixtures::MAIN_SITE;
use stagesync_codec::{ChangeSet, Row, TranslationSeed, Value, PARAMETERS_TABLE};
use stagesync_core::document::{columns::*, DOCUMENT_TYPE};
use stagesync_core::{ChangeTask, TaskKind};
use uuid::Uuid;

/// Serializes a change-set into a task.
pub fn task(kind: TaskKind, object_type: &str, change_set: &ChangeSet) -> ChangeTask {
    ChangeTask::new(kind, object_type, change_set.encode().expect("encodable change-set"))
}

/// Source-side tag group with its tags.
#[derive(Debug, Clone)]
pub struct TagGroupSource {
    /// Source identifier.
    pub id: i64,
    /// Code name.
    pub name: String,
    /// GUID.
    pub guid: Uuid,
    /// Source site identifier, seeded as [`MAIN_SITE`].
    pub site_id: i64,
    /// Tags as `(source id, name, guid)`.
    pub tags: Vec<(i64, String, Uuid)>,
}

impl TagGroupSource {
    /// A tag group without tags.
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            guid: Uuid::new_v4(),
            site_id: 70,
            tags: Vec::new(),
        }
    }

    /// Adds a tag with a fresh GUID; source identifiers start at 100.
    #[must_use]
    pub fn tag(mut self, name: &str) -> Self {
        let id = 100 + self.tags.len() as i64;
        self.tags.push((id, name.to_string(), Uuid::new_v4()));
        self
    }

    /// The tag group row.
    pub fn row(&self) -> Row {
        Row::new()
            .with("TagGroupID", self.id)
            .with("TagGroupGUID", self.guid)
            .with("TagGroupName", self.name.as_str())
            .with("TagGroupDisplayName", format!("{} tags", self.name))
            .with("TagGroupSiteID", self.site_id)
    }

    /// The change-set of an `UpdateObject` task for the group.
    pub fn change_set(&self) -> ChangeSet {
        let mut set = ChangeSet::new()
            .with_row(TAG_GROUP, self.row())
            .with_seed(TranslationSeed::by_code_name("cms.site", self.site_id, MAIN_SITE));
        set.ensure_table(TAG);
        for (order, (id, name, guid)) in self.tags.iter().enumerate() {
            set.add_row(
                TAG,
                Row::new()
                    .with("TagID", *id)
                    .with("TagGUID", *guid)
                    .with("TagName", name.as_str())
                    .with("TagGroupID", self.id)
                    .with("TagOrder", order as i64 + 1),
            );
        }
        set
    }

    /// The serialized `UpdateObject` task.
    pub fn task(&self) -> ChangeTask {
        task(TaskKind::UpdateObject, TAG_GROUP, &self.change_set())
    }
}

/// Builds the change-set of a document task.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    node: Row,
    culture: Row,
    parameters: Row,
    extra: ChangeSet,
}

impl DocumentBuilder {
    /// A document of `class_name` at `alias_path` in `culture`.
    ///
    /// Source node and document identifiers are 500 and 900.
    pub fn new(guid: Uuid, class_name: &str, alias_path: &str, culture: &str) -> Self {
        let alias = alias_path.rsplit('/').next().unwrap_or_default();
        Self {
            node: Row::new()
                .with(NODE_ID, 500)
                .with(NODE_GUID, guid)
                .with(NODE_ALIAS_PATH, alias_path)
                .with(NODE_ALIAS, alias)
                .with(CLASS_NAME, class_name),
            culture: Row::new()
                .with(DOCUMENT_ID, 900)
                .with(DOCUMENT_CULTURE, culture)
                .with(DOCUMENT_NAME, alias),
            parameters: Row::new(),
            extra: ChangeSet::new(),
        }
    }

    /// Sets source node and document identifiers.
    #[must_use]
    pub fn ids(mut self, node_id: i64, document_id: i64) -> Self {
        self.node.set(NODE_ID, node_id);
        self.culture.set(DOCUMENT_ID, document_id);
        self
    }

    /// Sets a node or culture column, routed by its `Node` prefix.
    #[must_use]
    pub fn column(mut self, column: &str, value: impl Into<Value>) -> Self {
        if column.starts_with("Node") || column == CLASS_NAME {
            self.node.set(column, value);
        } else {
            self.culture.set(column, value);
        }
        self
    }

    /// Makes the document a link to the node with `guid`.
    #[must_use]
    pub fn linked_to(self, guid: Uuid) -> Self {
        self.column(NODE_LINKED_NODE_GUID, guid)
    }

    /// Adds a task parameter.
    #[must_use]
    pub fn parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.set(name, value);
        self
    }

    /// Adds a row to an auxiliary table.
    #[must_use]
    pub fn row(mut self, table: &str, row: Row) -> Self {
        self.extra.add_row(table, row);
        self
    }

    /// Adds a translation seed.
    #[must_use]
    pub fn seed(mut self, seed: TranslationSeed) -> Self {
        self.extra.add_seed(seed);
        self
    }

    /// The source node identifier.
    pub fn node_id(&self) -> i64 {
        self.node.id(NODE_ID).unwrap_or_default()
    }

    /// The source document identifier.
    pub fn document_id(&self) -> i64 {
        self.culture.id(DOCUMENT_ID).unwrap_or_default()
    }

    /// The flattened change-set.
    pub fn build(&self) -> ChangeSet {
        let mut set = self.extra.clone();
        let row: Row = self
            .node
            .iter()
            .chain(self.culture.iter())
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect();
        set.tables.remove(DOCUMENT_TYPE);
        set.add_row(DOCUMENT_TYPE, row);
        if !self.parameters.is_empty() {
            set.tables.remove(PARAMETERS_TABLE);
            set.add_row(PARAMETERS_TABLE, self.parameters.clone());
        }
        set
    }

    /// The serialized task of `kind`.
    pub fn task(&self, kind: TaskKind) -> ChangeTask {
        let class_name = self.node.text(CLASS_NAME).unwrap_or_default().to_string();
        task(kind, &class_name, &self.build())
    }
}
