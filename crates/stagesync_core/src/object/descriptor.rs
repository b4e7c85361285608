//! Static per-type metadata.

use crate::error::{StagingError, StagingResult};
use crate::types::{MergePolicy, TaskKind};
use stagesync_codec::Value;
use std::collections::BTreeMap;

/// A column holding the identifier of another object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Column name.
    pub column: String,
    /// Object type the column points at.
    pub target_type: String,
    /// Whether an unresolvable value blocks the object. Optional references
    /// are cleared instead.
    pub required: bool,
    /// Whether the active default for the target type stands in for an
    /// unresolved value.
    pub fallback: bool,
}

/// Link from a child type to its parent type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    /// Parent object type.
    pub object_type: String,
    /// Column holding the parent identifier.
    pub column: String,
}

/// A column that keeps its target value on update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedColumn {
    /// Column name.
    pub column: String,
    /// Value written when the object is inserted.
    pub default: Value,
}

/// Columns identifying the physical file that belongs to a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryColumns {
    /// Column holding the blob GUID.
    pub guid_column: String,
    /// Column holding the file extension.
    pub extension_column: String,
}

/// Declares how the engine treats one object type.
///
/// Descriptors are built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ObjectTypeDescriptor {
    /// Type name, also the change-set table name.
    pub object_type: String,
    /// Primary key column.
    pub id_column: String,
    /// GUID column.
    pub guid_column: Option<String>,
    /// Code name column.
    pub code_name_column: Option<String>,
    /// Site column; its presence makes the type site-scoped.
    pub site_column: Option<String>,
    /// Group column (e.g. the owning group of a tag).
    pub group: Option<Reference>,
    /// Parent relationship.
    pub parent: Option<ParentLink>,
    /// Every foreign-reference column, including parent, site and group.
    pub references: Vec<Reference>,
    /// Child object types.
    pub children: Vec<String>,
    /// Binding object types.
    pub bindings: Vec<String>,
    /// Category object types, applied before children and never deleted.
    pub categories: Vec<String>,
    /// The type is a many-to-many association.
    pub is_binding: bool,
    /// The type is a binding to a site, handled by the site-binding manager.
    pub is_site_binding: bool,
    /// The type is the site type itself.
    pub is_site: bool,
    /// Restore reuses the original identifier.
    pub restore_preserves_id: bool,
    /// Columns never overwritten on update.
    pub excluded_columns: Vec<ExcludedColumn>,
    /// Physical file columns.
    pub binary: Option<BinaryColumns>,
    merge_policies: BTreeMap<TaskKind, MergePolicy>,
}

impl ObjectTypeDescriptor {
    /// Creates a descriptor with only an identifier column.
    pub fn new(object_type: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id_column: id_column.into(),
            guid_column: None,
            code_name_column: None,
            site_column: None,
            group: None,
            parent: None,
            references: Vec::new(),
            children: Vec::new(),
            bindings: Vec::new(),
            categories: Vec::new(),
            is_binding: false,
            is_site_binding: false,
            is_site: false,
            restore_preserves_id: false,
            excluded_columns: Vec::new(),
            binary: None,
            merge_policies: BTreeMap::new(),
        }
    }

    /// Sets the GUID column.
    #[must_use]
    pub fn guid(mut self, column: impl Into<String>) -> Self {
        self.guid_column = Some(column.into());
        self
    }

    /// Sets the code name column.
    #[must_use]
    pub fn code_name(mut self, column: impl Into<String>) -> Self {
        self.code_name_column = Some(column.into());
        self
    }

    /// Sets the site column, referencing `site_type`.
    #[must_use]
    pub fn site(mut self, column: impl Into<String>, site_type: impl Into<String>) -> Self {
        let column = column.into();
        self.site_column = Some(column.clone());
        self.push_reference(column, site_type.into(), false);
        self
    }

    /// Sets the group column.
    #[must_use]
    pub fn group(mut self, column: impl Into<String>, group_type: impl Into<String>) -> Self {
        let reference = Reference {
            column: column.into(),
            target_type: group_type.into(),
            required: true,
            fallback: false,
        };
        self.push_reference(
            reference.column.clone(),
            reference.target_type.clone(),
            true,
        );
        self.group = Some(reference);
        self
    }

    /// Sets the parent relationship.
    #[must_use]
    pub fn parent(mut self, column: impl Into<String>, parent_type: impl Into<String>) -> Self {
        let link = ParentLink {
            object_type: parent_type.into(),
            column: column.into(),
        };
        self.push_reference(link.column.clone(), link.object_type.clone(), true);
        self.parent = Some(link);
        self
    }

    /// Declares a required foreign reference.
    #[must_use]
    pub fn reference(mut self, column: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.push_reference(column.into(), target_type.into(), true);
        self
    }

    /// Declares an optional foreign reference.
    #[must_use]
    pub fn optional_reference(
        mut self,
        column: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        self.push_reference(column.into(), target_type.into(), false);
        self
    }

    /// Declares an optional reference to a user who owns or last touched
    /// the object. An unresolved value takes the fallback user.
    #[must_use]
    pub fn owner_reference(
        mut self,
        column: impl Into<String>,
        user_type: impl Into<String>,
    ) -> Self {
        self.push_reference(column.into(), user_type.into(), false);
        if let Some(reference) = self.references.last_mut() {
            reference.fallback = true;
        }
        self
    }

    /// Declares a child type.
    #[must_use]
    pub fn child(mut self, object_type: impl Into<String>) -> Self {
        self.children.push(object_type.into());
        self
    }

    /// Declares a binding type.
    #[must_use]
    pub fn binding(mut self, object_type: impl Into<String>) -> Self {
        self.bindings.push(object_type.into());
        self
    }

    /// Declares a category type.
    #[must_use]
    pub fn category(mut self, object_type: impl Into<String>) -> Self {
        self.categories.push(object_type.into());
        self
    }

    /// Marks the type as a binding.
    #[must_use]
    pub fn as_binding(mut self) -> Self {
        self.is_binding = true;
        self
    }

    /// Marks the type as a site binding.
    #[must_use]
    pub fn as_site_binding(mut self) -> Self {
        self.is_binding = true;
        self.is_site_binding = true;
        self
    }

    /// Marks the type as the site type.
    #[must_use]
    pub fn as_site(mut self) -> Self {
        self.is_site = true;
        self
    }

    /// Lets restore reuse the original identifier.
    #[must_use]
    pub fn restorable(mut self) -> Self {
        self.restore_preserves_id = true;
        self
    }

    /// Declares a column preserved on update.
    #[must_use]
    pub fn exclude(mut self, column: impl Into<String>, default: impl Into<Value>) -> Self {
        self.excluded_columns.push(ExcludedColumn {
            column: column.into(),
            default: default.into(),
        });
        self
    }

    /// Declares the physical file columns.
    #[must_use]
    pub fn binary(
        mut self,
        guid_column: impl Into<String>,
        extension_column: impl Into<String>,
    ) -> Self {
        self.binary = Some(BinaryColumns {
            guid_column: guid_column.into(),
            extension_column: extension_column.into(),
        });
        self
    }

    /// Sets the child/binding merge policy for a task kind.
    #[must_use]
    pub fn merge_policy(mut self, kind: TaskKind, policy: MergePolicy) -> Self {
        self.merge_policies.insert(kind, policy);
        self
    }

    /// Returns the merge policy for a task kind; `Complete` unless declared.
    pub fn merge_policy_for(&self, kind: TaskKind) -> MergePolicy {
        self.merge_policies.get(&kind).copied().unwrap_or_default()
    }

    /// Returns the column linking this type to `parent_type`.
    ///
    /// # Errors
    ///
    /// Returns a structural error when the type declares no such parent.
    pub fn parent_column_for(&self, parent_type: &str) -> StagingResult<&str> {
        match &self.parent {
            Some(link) if link.object_type == parent_type => Ok(&link.column),
            _ => self
                .references
                .iter()
                .find(|r| r.target_type == parent_type)
                .map(|r| r.column.as_str())
                .ok_or_else(|| {
                    StagingError::structural(format!(
                        "{} declares no column referencing {}",
                        self.object_type, parent_type
                    ))
                }),
        }
    }

    /// Returns the declared reference for `column`.
    pub fn reference_for(&self, column: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.column == column)
    }

    /// Returns true if `column` keeps its target value on update.
    pub fn is_excluded(&self, column: &str) -> bool {
        self.excluded_columns.iter().any(|c| c.column == column)
    }

    fn push_reference(&mut self, column: String, target_type: String, required: bool) {
        self.references.retain(|r| r.column != column);
        self.references.push(Reference {
            column,
            target_type,
            required,
            fallback: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag() -> ObjectTypeDescriptor {
        ObjectTypeDescriptor::new("cms.tag", "TagID")
            .guid("TagGUID")
            .code_name("TagName")
            .parent("TagGroupID", "cms.taggroup")
            .owner_reference("TagOwnerID", "cms.user")
            .optional_reference("TagReviewerID", "cms.user")
            .exclude("TagCount", 0)
    }

    #[test]
    fn parent_is_a_required_reference() {
        let desc = tag();
        let reference = desc.reference_for("TagGroupID").unwrap();
        assert!(reference.required);
        assert_eq!(reference.target_type, "cms.taggroup");
        assert!(!desc.reference_for("TagOwnerID").unwrap().required);
    }

    #[test]
    fn only_owner_references_fall_back() {
        let desc = tag();
        let owner = desc.reference_for("TagOwnerID").unwrap();
        assert!(owner.fallback);
        assert!(!owner.required);
        assert!(!desc.reference_for("TagReviewerID").unwrap().fallback);
        assert!(!desc.reference_for("TagGroupID").unwrap().fallback);
    }

    #[test]
    fn parent_column_lookup() {
        let desc = tag();
        assert_eq!(desc.parent_column_for("cms.taggroup").unwrap(), "TagGroupID");
        assert_eq!(desc.parent_column_for("cms.user").unwrap(), "TagOwnerID");
        assert!(matches!(
            desc.parent_column_for("cms.site"),
            Err(StagingError::Structural { .. })
        ));
    }

    #[test]
    fn merge_policy_defaults_to_complete() {
        let desc = tag().merge_policy(TaskKind::CreateObject, MergePolicy::Partial);
        assert_eq!(desc.merge_policy_for(TaskKind::UpdateObject), MergePolicy::Complete);
        assert_eq!(desc.merge_policy_for(TaskKind::CreateObject), MergePolicy::Partial);
    }

    #[test]
    fn redeclared_reference_replaces_previous() {
        let desc = ObjectTypeDescriptor::new("cms.usersite", "UserSiteID")
            .reference("SiteID", "cms.site")
            .site("SiteID", "cms.site");
        assert_eq!(desc.references.len(), 1);
        assert!(!desc.references[0].required);
        assert!(!desc.is_excluded("SiteID"));
    }
}
