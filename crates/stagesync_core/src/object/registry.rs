//! Type-name to descriptor/constructor registry.

use super::descriptor::ObjectTypeDescriptor;
use super::record::{GenericObject, StagedObject};
use crate::error::{StagingError, StagingResult};
use crate::sync::PostApplyHook;
use stagesync_codec::Row;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds an empty instance of a registered type.
pub type ObjectConstructor = fn(Arc<ObjectTypeDescriptor>) -> Box<dyn StagedObject>;

struct RegistryEntry {
    descriptor: Arc<ObjectTypeDescriptor>,
    constructor: ObjectConstructor,
    hooks: Vec<PostApplyHook>,
}

/// Registry of every object type the engine can apply.
///
/// Populated at startup and read-only afterwards. A fresh registry already
/// knows the document sub-state types (attachments, aliases, ACL items, ...).
pub struct ObjectRegistry {
    entries: BTreeMap<String, RegistryEntry>,
    user_type: Option<String>,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRegistry {
    /// Creates a registry holding the built-in document types.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
            user_type: None,
        };
        for descriptor in crate::document::builtin_descriptors() {
            registry.register(descriptor);
        }
        registry
    }

    /// Registers a row-backed type.
    pub fn register(&mut self, descriptor: ObjectTypeDescriptor) {
        self.register_with(descriptor, GenericObject::boxed);
    }

    /// Registers a type with a dedicated record constructor.
    pub fn register_with(&mut self, descriptor: ObjectTypeDescriptor, constructor: ObjectConstructor) {
        let name = descriptor.object_type.clone();
        let hooks = self
            .entries
            .remove(&name)
            .map(|e| e.hooks)
            .unwrap_or_default();
        self.entries.insert(
            name,
            RegistryEntry {
                descriptor: Arc::new(descriptor),
                constructor,
                hooks,
            },
        );
    }

    /// Adds a post-apply hook to a registered type.
    ///
    /// # Errors
    ///
    /// Returns `NotSupported` if the type is unknown.
    pub fn add_hook(&mut self, object_type: &str, hook: PostApplyHook) -> StagingResult<()> {
        let entry = self
            .entries
            .get_mut(object_type)
            .ok_or_else(|| unknown_type(object_type))?;
        entry.hooks.push(hook);
        Ok(())
    }

    /// Declares which type holds users; unresolved user references fall
    /// back to the configured user of this type.
    pub fn set_user_type(&mut self, object_type: impl Into<String>) {
        self.user_type = Some(object_type.into());
    }

    /// The user type, if declared.
    pub fn user_type(&self) -> Option<&str> {
        self.user_type.as_deref()
    }

    /// The site type: the registered type flagged as a site.
    pub fn site_type(&self) -> Option<&ObjectTypeDescriptor> {
        self.entries
            .values()
            .map(|e| e.descriptor.as_ref())
            .find(|d| d.is_site)
    }

    /// Returns true if the type is registered.
    pub fn contains(&self, object_type: &str) -> bool {
        self.entries.contains_key(object_type)
    }

    /// Returns the descriptor of a type.
    ///
    /// # Errors
    ///
    /// Returns `NotSupported` if the type is unknown.
    pub fn descriptor(&self, object_type: &str) -> StagingResult<Arc<ObjectTypeDescriptor>> {
        self.entries
            .get(object_type)
            .map(|e| Arc::clone(&e.descriptor))
            .ok_or_else(|| unknown_type(object_type))
    }

    /// Returns the post-apply hooks of a type.
    pub fn hooks(&self, object_type: &str) -> &[PostApplyHook] {
        match self.entries.get(object_type) {
            Some(entry) => &entry.hooks,
            None => &[],
        }
    }

    /// Creates an instance of `object_type` loaded from `row`.
    ///
    /// # Errors
    ///
    /// Returns `NotSupported` for unknown types, or the record's own error
    /// when the row does not fit it.
    pub fn instantiate(&self, object_type: &str, row: &Row) -> StagingResult<Box<dyn StagedObject>> {
        let entry = self
            .entries
            .get(object_type)
            .ok_or_else(|| unknown_type(object_type))?;
        let mut object = (entry.constructor)(Arc::clone(&entry.descriptor));
        object.load_row(row)?;
        Ok(object)
    }

    /// Registered type names.
    pub fn object_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Binding types that attach `object_type` to sites.
    pub fn site_bindings_of(&self, object_type: &str) -> Vec<Arc<ObjectTypeDescriptor>> {
        let Ok(descriptor) = self.descriptor(object_type) else {
            return Vec::new();
        };
        descriptor
            .bindings
            .iter()
            .filter_map(|b| self.entries.get(b))
            .map(|e| Arc::clone(&e.descriptor))
            .filter(|d| d.is_site_binding)
            .collect()
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("types", &self.entries.keys().collect::<Vec<_>>())
            .field("user_type", &self.user_type)
            .finish()
    }
}

fn unknown_type(object_type: &str) -> StagingError {
    StagingError::not_supported(format!("unknown object type '{object_type}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ObjectRegistry {
        let mut registry = ObjectRegistry::new();
        registry.register(
            ObjectTypeDescriptor::new("cms.site", "SiteID")
                .code_name("SiteName")
                .as_site(),
        );
        registry.register(
            ObjectTypeDescriptor::new("cms.user", "UserID")
                .code_name("UserName")
                .binding("cms.usersite"),
        );
        registry.register(
            ObjectTypeDescriptor::new("cms.usersite", "UserSiteID")
                .parent("UserID", "cms.user")
                .reference("SiteID", "cms.site")
                .as_site_binding(),
        );
        registry.set_user_type("cms.user");
        registry
    }

    #[test]
    fn builtins_are_present() {
        let registry = ObjectRegistry::new();
        assert!(registry.contains(crate::document::ATTACHMENT_TYPE));
        assert!(registry.contains(crate::document::ACL_ITEM_TYPE));
    }

    #[test]
    fn unknown_type_is_not_supported() {
        let registry = registry();
        assert!(matches!(
            registry.descriptor("cms.poll"),
            Err(StagingError::NotSupported { .. })
        ));
        assert!(registry.hooks("cms.poll").is_empty());
    }

    #[test]
    fn site_and_user_types() {
        let registry = registry();
        assert_eq!(registry.site_type().unwrap().object_type, "cms.site");
        assert_eq!(registry.user_type(), Some("cms.user"));
        let bindings = registry.site_bindings_of("cms.user");
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].object_type, "cms.usersite");
    }

    #[test]
    fn instantiate_loads_row() {
        let registry = registry();
        let obj = registry
            .instantiate("cms.user", &Row::new().with("UserID", 5).with("UserName", "ann"))
            .unwrap();
        assert_eq!(obj.id(), Some(5));
        assert_eq!(obj.code_name().as_deref(), Some("ann"));
    }

    #[test]
    fn hooks_survive_reregistration() {
        let mut registry = registry();
        registry
            .add_hook("cms.user", PostApplyHook::NormalizeOrder { order_column: "UserOrder".into() })
            .unwrap();
        registry.register(ObjectTypeDescriptor::new("cms.user", "UserID").code_name("UserName"));
        assert_eq!(registry.hooks("cms.user").len(), 1);
    }
}
