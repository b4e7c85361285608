//! Document node shape, column names and built-in sub-state types.

use crate::object::ObjectTypeDescriptor;
use stagesync_codec::{Row, Value};
use uuid::Uuid;

/// Translation type for tree nodes (shared by all culture versions).
pub const NODE_TYPE: &str = "cms.node";
/// Translation type and change-set table for culture versions.
pub const DOCUMENT_TYPE: &str = "cms.document";
/// Attachment type.
pub const ATTACHMENT_TYPE: &str = "cms.attachment";
/// Document alias (alternative URL) type.
pub const ALIAS_TYPE: &str = "cms.documentalias";
/// Related-document type.
pub const RELATIONSHIP_TYPE: &str = "cms.relationship";
/// Document-to-category binding type.
pub const DOCUMENT_CATEGORY_TYPE: &str = "cms.documentcategory";
/// Page template type.
pub const PAGE_TEMPLATE_TYPE: &str = "cms.pagetemplate";
/// Access-control list type.
pub const ACL_TYPE: &str = "cms.acl";
/// Access-control entry type.
pub const ACL_ITEM_TYPE: &str = "cms.aclitem";
/// Personalization variant type.
pub const VARIANT_TYPE: &str = "cms.variant";
/// Version history table.
pub const VERSION_HISTORY_TABLE: &str = "cms.versionhistory";
/// Attachment history table.
pub const ATTACHMENT_HISTORY_TABLE: &str = "cms.attachmenthistory";
/// Category type referenced by document categories.
pub const CATEGORY_TYPE: &str = "cms.category";
/// User type referenced by ACL entries.
pub const USER_TYPE: &str = "cms.user";
/// Role type referenced by ACL entries.
pub const ROLE_TYPE: &str = "cms.role";

/// Column names used by the document synchronizer.
pub mod columns {
    /// Node identifier.
    pub const NODE_ID: &str = "NodeID";
    /// Node GUID.
    pub const NODE_GUID: &str = "NodeGUID";
    /// Parent node identifier.
    pub const NODE_PARENT_ID: &str = "NodeParentID";
    /// Parent node GUID (parameters table; fallback parent lookup).
    pub const NODE_PARENT_GUID: &str = "NodeParentGUID";
    /// Full alias path, e.g. `/Articles/Foo`.
    pub const NODE_ALIAS_PATH: &str = "NodeAliasPath";
    /// Last alias path segment.
    pub const NODE_ALIAS: &str = "NodeAlias";
    /// Sibling order.
    pub const NODE_ORDER: &str = "NodeOrder";
    /// Document class name.
    pub const CLASS_NAME: &str = "ClassName";
    /// Identifier of the node a link points at.
    pub const NODE_LINKED_NODE_ID: &str = "NodeLinkedNodeID";
    /// GUID of the node a link points at.
    pub const NODE_LINKED_NODE_GUID: &str = "NodeLinkedNodeGUID";
    /// Access-control list identifier.
    pub const NODE_ACL_ID: &str = "NodeACLID";
    /// Whether the node owns its access-control list.
    pub const NODE_IS_ACL_OWNER: &str = "NodeIsACLOwner";
    /// Owner user.
    pub const NODE_OWNER: &str = "NodeOwner";
    /// Site identifier.
    pub const NODE_SITE_ID: &str = "NodeSiteID";
    /// Culture version identifier.
    pub const DOCUMENT_ID: &str = "DocumentID";
    /// Node a culture version belongs to.
    pub const DOCUMENT_NODE_ID: &str = "DocumentNodeID";
    /// Culture code.
    pub const DOCUMENT_CULTURE: &str = "DocumentCulture";
    /// Document display name.
    pub const DOCUMENT_NAME: &str = "DocumentName";
    /// Published flag.
    pub const DOCUMENT_IS_PUBLISHED: &str = "DocumentIsPublished";
    /// Published version.
    pub const DOCUMENT_PUBLISHED_VERSION: &str = "DocumentPublishedVersionHistoryID";
    /// Current (checked-out) version.
    pub const DOCUMENT_CHECKED_OUT_VERSION: &str = "DocumentCheckedOutVersionHistoryID";
    /// Page template.
    pub const DOCUMENT_PAGE_TEMPLATE_ID: &str = "DocumentPageTemplateID";
    /// Last modifying user.
    pub const DOCUMENT_MODIFIED_BY: &str = "DocumentModifiedByUserID";
    /// Workflow step the document is in.
    pub const DOCUMENT_WORKFLOW_STEP_ID: &str = "DocumentWorkflowStepID";

    /// Version history identifier.
    pub const VERSION_HISTORY_ID: &str = "VersionHistoryID";
    /// Document a version belongs to.
    pub const VERSION_DOCUMENT_ID: &str = "DocumentID";
    /// Scheduled publish time, Unix milliseconds.
    pub const VERSION_PUBLISH_FROM: &str = "PublishFrom";
    /// Workflow step name the version was in.
    pub const VERSION_STEP_NAME: &str = "VersionWorkflowStepName";
    /// Attachment history identifier.
    pub const ATTACHMENT_HISTORY_ID: &str = "AttachmentHistoryID";
    /// Version an attachment history row belongs to.
    pub const ATTACHMENT_HISTORY_VERSION_ID: &str = "AttachmentHistoryVersionID";
    /// Variant parent of an attachment history row.
    pub const ATTACHMENT_HISTORY_VARIANT_PARENT_ID: &str = "AttachmentHistoryVariantParentID";

    /// Attachment owner document.
    pub const ATTACHMENT_DOCUMENT_ID: &str = "AttachmentDocumentID";
    /// Attachment GUID.
    pub const ATTACHMENT_GUID: &str = "AttachmentGUID";
    /// Alias owner node.
    pub const ALIAS_NODE_ID: &str = "AliasNodeID";
    /// Relationship left side.
    pub const RELATIONSHIP_LEFT_NODE_ID: &str = "LeftNodeID";
    /// Relationship right side.
    pub const RELATIONSHIP_RIGHT_NODE_ID: &str = "RightNodeID";
    /// Relationship left side GUID (change-set only).
    pub const RELATIONSHIP_LEFT_NODE_GUID: &str = "LeftNodeGUID";
    /// Relationship right side GUID (change-set only).
    pub const RELATIONSHIP_RIGHT_NODE_GUID: &str = "RightNodeGUID";
    /// Relationship name.
    pub const RELATIONSHIP_NAME: &str = "RelationshipName";
    /// Relationship order.
    pub const RELATIONSHIP_ORDER: &str = "RelationshipOrder";
    /// Relationship custom data.
    pub const RELATIONSHIP_CUSTOM_DATA: &str = "RelationshipCustomData";
    /// Category binding document.
    pub const DOCUMENT_CATEGORY_DOCUMENT_ID: &str = "DocumentID";
    /// Variant owner document.
    pub const VARIANT_DOCUMENT_ID: &str = "VariantDocumentID";
    /// Access-control list identifier.
    pub const ACL_ID: &str = "ACLID";
    /// Access-control list GUID.
    pub const ACL_GUID: &str = "ACLGUID";
    /// Node owning an access-control list.
    pub const ACL_OWNER_NODE_ID: &str = "ACLOwnerNodeID";
    /// Access-control entry GUID.
    pub const ACL_ITEM_GUID: &str = "ACLItemGUID";
    /// User an access-control entry applies to.
    pub const ACL_ITEM_USER_ID: &str = "UserID";
    /// Role an access-control entry applies to.
    pub const ACL_ITEM_ROLE_ID: &str = "RoleID";

    /// Parameter: copy permissions when moving.
    pub const PARAM_COPY_PERMISSIONS: &str = "copyPermissions";
    /// Parameter: specific workflow step name.
    pub const PARAM_STEP_NAME: &str = "StepName";
    /// Parameter: the node inherits its parent's access-control list.
    pub const PARAM_INHERITS_ACL: &str = "NodeInheritsACL";
    /// Parameter: the source document is published.
    pub const PARAM_IS_PUBLISHED: &str = "DocumentIsPublished";
    /// Parameter: the task carries workflow data.
    pub const PARAM_HAS_WORKFLOW: &str = "HasWorkflow";
    /// Parameter: site the task belongs to on the source.
    pub const PARAM_SITE_NAME: &str = "SiteName";
}

use columns::*;

/// One document as seen by the synchronizer: the tree node plus, when a
/// culture was requested and exists, that culture version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentNode {
    /// Node-level columns (shared by all cultures).
    pub node: Row,
    /// Culture-level columns.
    pub culture: Option<Row>,
}

impl DocumentNode {
    /// Creates a view over a node row and an optional culture row.
    pub fn new(node: Row, culture: Option<Row>) -> Self {
        Self { node, culture }
    }

    /// Node identifier.
    pub fn node_id(&self) -> Option<i64> {
        self.node.id(NODE_ID)
    }

    /// Node GUID.
    pub fn guid(&self) -> Option<Uuid> {
        self.node.guid(NODE_GUID)
    }

    /// Parent node identifier; `None` for the root.
    pub fn parent_id(&self) -> Option<i64> {
        self.node.id(NODE_PARENT_ID)
    }

    /// Alias path.
    pub fn alias_path(&self) -> &str {
        self.node.text(NODE_ALIAS_PATH).unwrap_or("/")
    }

    /// Class name.
    pub fn class_name(&self) -> Option<&str> {
        self.node.text(CLASS_NAME)
    }

    /// Linked node identifier, when this node is a link.
    pub fn linked_node_id(&self) -> Option<i64> {
        self.node.id(NODE_LINKED_NODE_ID)
    }

    /// Returns true if this node only points at another node.
    pub fn is_link(&self) -> bool {
        self.linked_node_id().is_some()
    }

    /// Access-control list identifier.
    pub fn acl_id(&self) -> Option<i64> {
        self.node.id(NODE_ACL_ID)
    }

    /// Whether the node owns its access-control list.
    pub fn is_acl_owner(&self) -> bool {
        self.node.flag(NODE_IS_ACL_OWNER)
    }

    /// Site identifier.
    pub fn site_id(&self) -> Option<i64> {
        self.node.id(NODE_SITE_ID)
    }

    /// Culture version identifier.
    pub fn document_id(&self) -> Option<i64> {
        self.culture.as_ref().and_then(|c| c.id(DOCUMENT_ID))
    }

    /// Culture code of the loaded version.
    pub fn culture_code(&self) -> Option<&str> {
        self.culture.as_ref().and_then(|c| c.text(DOCUMENT_CULTURE))
    }

    /// Returns true for the root node.
    pub fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }
}

/// Splits a flattened document row into node and culture columns.
///
/// Node columns are those prefixed `Node` plus `ClassName`.
pub fn split_document_row(row: &Row) -> (Row, Row) {
    let mut node = Row::new();
    let mut culture = Row::new();
    for (column, value) in row.iter() {
        if column.starts_with("Node") || column == CLASS_NAME {
            node.set(column.clone(), value.clone());
        } else {
            culture.set(column.clone(), value.clone());
        }
    }
    (node, culture)
}

/// Parent path of an alias path; `None` for the root.
pub fn parent_path(alias_path: &str) -> Option<&str> {
    let trimmed = alias_path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&trimmed[..i]),
        None => Some("/"),
    }
}

/// Joins a parent path and an alias segment.
pub fn child_path(parent: &str, alias: &str) -> String {
    if parent == "/" {
        format!("/{alias}")
    } else {
        format!("{parent}/{alias}")
    }
}

/// Descriptors of the document sub-state types.
pub fn builtin_descriptors() -> Vec<ObjectTypeDescriptor> {
    vec![
        ObjectTypeDescriptor::new(ATTACHMENT_TYPE, "AttachmentID")
            .guid(ATTACHMENT_GUID)
            .parent(ATTACHMENT_DOCUMENT_ID, DOCUMENT_TYPE)
            .optional_reference("AttachmentVariantParentID", ATTACHMENT_TYPE)
            .binary(ATTACHMENT_GUID, "AttachmentExtension"),
        ObjectTypeDescriptor::new(ALIAS_TYPE, "AliasID")
            .guid("AliasGUID")
            .parent(ALIAS_NODE_ID, NODE_TYPE),
        ObjectTypeDescriptor::new(RELATIONSHIP_TYPE, "RelationshipID")
            .reference(RELATIONSHIP_LEFT_NODE_ID, NODE_TYPE)
            .reference(RELATIONSHIP_RIGHT_NODE_ID, NODE_TYPE)
            .as_binding(),
        ObjectTypeDescriptor::new(DOCUMENT_CATEGORY_TYPE, "DocumentCategoryID")
            .parent(DOCUMENT_CATEGORY_DOCUMENT_ID, DOCUMENT_TYPE)
            .reference("CategoryID", CATEGORY_TYPE)
            .as_binding(),
        ObjectTypeDescriptor::new(PAGE_TEMPLATE_TYPE, "PageTemplateID")
            .guid("PageTemplateGUID")
            .code_name("PageTemplateCodeName"),
        ObjectTypeDescriptor::new(ACL_TYPE, "ACLID")
            .guid(ACL_GUID)
            .optional_reference(ACL_OWNER_NODE_ID, NODE_TYPE),
        ObjectTypeDescriptor::new(ACL_ITEM_TYPE, "ACLItemID")
            .guid(ACL_ITEM_GUID)
            .parent(ACL_ID, ACL_TYPE)
            .optional_reference(ACL_ITEM_USER_ID, USER_TYPE)
            .optional_reference(ACL_ITEM_ROLE_ID, ROLE_TYPE),
        ObjectTypeDescriptor::new(VARIANT_TYPE, "VariantID")
            .guid("VariantGUID")
            .code_name("VariantName")
            .parent(VARIANT_DOCUMENT_ID, DOCUMENT_TYPE),
    ]
}

/// Returns `value` as a boolean, treating missing values as false.
pub(crate) fn truthy(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_separates_node_columns() {
        let row = Row::new()
            .with(NODE_GUID, Uuid::nil())
            .with(NODE_ALIAS_PATH, "/Articles/Foo")
            .with(CLASS_NAME, "cms.article")
            .with(DOCUMENT_CULTURE, "en-us")
            .with("ArticleTitle", "Foo");
        let (node, culture) = split_document_row(&row);
        assert_eq!(node.len(), 3);
        assert_eq!(culture.text(DOCUMENT_CULTURE), Some("en-us"));
        assert_eq!(culture.text("ArticleTitle"), Some("Foo"));
    }

    #[test]
    fn path_helpers() {
        assert_eq!(parent_path("/"), None);
        assert_eq!(parent_path("/Articles"), Some("/"));
        assert_eq!(parent_path("/Articles/Foo"), Some("/Articles"));
        assert_eq!(parent_path("/Articles/Foo/"), Some("/Articles"));
        assert_eq!(child_path("/", "Articles"), "/Articles");
        assert_eq!(child_path("/Articles", "Foo"), "/Articles/Foo");
    }

    #[test]
    fn node_view() {
        let doc = DocumentNode::new(
            Row::new().with(NODE_ID, 4).with(NODE_PARENT_ID, 1).with(NODE_LINKED_NODE_ID, 9),
            Some(Row::new().with(DOCUMENT_ID, 12).with(DOCUMENT_CULTURE, "de-de")),
        );
        assert_eq!(doc.node_id(), Some(4));
        assert!(doc.is_link());
        assert!(!doc.is_root());
        assert_eq!(doc.document_id(), Some(12));
        assert_eq!(doc.culture_code(), Some("de-de"));
        assert_eq!(doc.alias_path(), "/");
    }
}
