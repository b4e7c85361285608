//! Column access over staged objects.

use super::descriptor::ObjectTypeDescriptor;
use crate::error::StagingResult;
use stagesync_codec::{Row, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// An object instance the engine can apply.
///
/// Implementations expose their columns by name; the engine only touches the
/// identifying and reference columns the descriptor declares, and otherwise
/// moves whole rows in and out through [`to_row`](Self::to_row) and
/// [`load_row`](Self::load_row).
pub trait StagedObject: fmt::Debug + Send {
    /// The object's type descriptor.
    fn descriptor(&self) -> &ObjectTypeDescriptor;

    /// Returns the value of `column`, `Null` when unset.
    fn get(&self, column: &str) -> Value;

    /// Sets `column`.
    fn set(&mut self, column: &str, value: Value);

    /// Returns all columns as a row.
    fn to_row(&self) -> Row;

    /// Overwrites the columns present in `row`.
    ///
    /// # Errors
    ///
    /// Typed implementations reject values of the wrong shape.
    fn load_row(&mut self, row: &Row) -> StagingResult<()>;

    /// Object identifier.
    fn id(&self) -> Option<i64> {
        self.get(&self.descriptor().id_column).as_id()
    }

    /// Sets the object identifier; `None` clears it.
    fn set_id(&mut self, id: Option<i64>) {
        let column = self.descriptor().id_column.clone();
        self.set(&column, id.into());
    }

    /// Object GUID.
    fn guid(&self) -> Option<Uuid> {
        let column = self.descriptor().guid_column.clone()?;
        self.get(&column).as_guid()
    }

    /// Object code name.
    fn code_name(&self) -> Option<String> {
        let column = self.descriptor().code_name_column.clone()?;
        self.get(&column).as_text().map(str::to_string)
    }

    /// Site identifier.
    fn site_id(&self) -> Option<i64> {
        let column = self.descriptor().site_column.clone()?;
        self.get(&column).as_id()
    }

    /// Parent identifier.
    fn parent_id(&self) -> Option<i64> {
        let column = self.descriptor().parent.as_ref()?.column.clone();
        self.get(&column).as_id()
    }

    /// Group identifier.
    fn group_id(&self) -> Option<i64> {
        let column = self.descriptor().group.as_ref()?.column.clone();
        self.get(&column).as_id()
    }
}

/// Row-backed object for types without a dedicated record.
#[derive(Debug, Clone)]
pub struct GenericObject {
    descriptor: Arc<ObjectTypeDescriptor>,
    row: Row,
}

impl GenericObject {
    /// Creates an empty object of the given type.
    pub fn new(descriptor: Arc<ObjectTypeDescriptor>) -> Self {
        Self {
            descriptor,
            row: Row::new(),
        }
    }

    /// Boxed constructor, usable as a registry factory.
    pub fn boxed(descriptor: Arc<ObjectTypeDescriptor>) -> Box<dyn StagedObject> {
        Box::new(Self::new(descriptor))
    }
}

impl StagedObject for GenericObject {
    fn descriptor(&self) -> &ObjectTypeDescriptor {
        &self.descriptor
    }

    fn get(&self, column: &str) -> Value {
        self.row.get(column).clone()
    }

    fn set(&mut self, column: &str, value: Value) {
        self.row.set(column, value);
    }

    fn to_row(&self) -> Row {
        self.row.clone()
    }

    fn load_row(&mut self, row: &Row) -> StagingResult<()> {
        for (column, value) in row.iter() {
            self.row.set(column.clone(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessor_defaults_follow_descriptor() {
        let desc = Arc::new(
            ObjectTypeDescriptor::new("cms.tag", "TagID")
                .guid("TagGUID")
                .code_name("TagName")
                .parent("TagGroupID", "cms.taggroup"),
        );
        let guid = Uuid::new_v4();
        let mut obj = GenericObject::new(desc);
        obj.load_row(
            &Row::new()
                .with("TagID", 3)
                .with("TagGUID", guid)
                .with("TagName", "red")
                .with("TagGroupID", 9),
        )
        .unwrap();

        assert_eq!(obj.id(), Some(3));
        assert_eq!(obj.guid(), Some(guid));
        assert_eq!(obj.code_name().as_deref(), Some("red"));
        assert_eq!(obj.parent_id(), Some(9));
        assert_eq!(obj.site_id(), None);

        obj.set_id(None);
        assert_eq!(obj.id(), None);
        assert!(obj.to_row().get("TagID").is_null());
    }
}
