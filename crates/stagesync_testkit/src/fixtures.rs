//! Sample schema and a host bundling in-memory collaborators.

use stagesync_codec::{Row, Value};
use stagesync_core::document::{columns, DocumentNode};
use stagesync_core::memory::{
    MemoryCache, MemoryDocumentRepository, MemoryEventLog, MemoryObjectStore,
    MemoryReplicationLog, MemoryWorkflowService,
};
use stagesync_core::{
    DocumentRepository, Host, ObjectRegistry, ObjectStore, ObjectTypeDescriptor, PostApplyHook,
    StagedObject, StagingConfig, StagingError, StagingResult, StagingService,
};
use stagesync_storage::MemoryBlobStore;
use std::sync::Arc;
use uuid::Uuid;

/// Object type names of the sample schema.
pub mod types {
    /// Sites.
    pub const SITE: &str = "cms.site";
    /// Users.
    pub const USER: &str = "cms.user";
    /// Roles, site-scoped.
    pub const ROLE: &str = "cms.role";
    /// User-to-role binding.
    pub const USER_ROLE: &str = "cms.userrole";
    /// User-to-site binding.
    pub const USER_SITE: &str = "cms.usersite";
    /// Tag groups, site-scoped, with tags as children.
    pub const TAG_GROUP: &str = "cms.taggroup";
    /// Tags.
    pub const TAG: &str = "cms.tag";
    /// Categories.
    pub const CATEGORY: &str = stagesync_core::document::CATEGORY_TYPE;
}

use types::*;

/// Code name of the site every [`TestHost`] starts with.
pub const MAIN_SITE: &str = "main";
/// Code name of the fallback user every [`TestHost`] starts with.
pub const ADMIN_USER: &str = "administrator";

/// Builds the sample schema.
///
/// Tag groups use the typed [`TagGroup`] record and keep a tag count that
/// a hook recomputes; tags renumber their siblings' `TagOrder`. Roles keep
/// their target `RoleNotes`. Users own personal categories, which nest
/// through `CategoryParentID`.
pub fn sample_registry() -> ObjectRegistry {
    let mut registry = ObjectRegistry::new();
    registry.register(
        ObjectTypeDescriptor::new(SITE, "SiteID")
            .guid("SiteGUID")
            .code_name("SiteName")
            .as_site(),
    );
    registry.register(
        ObjectTypeDescriptor::new(USER, "UserID")
            .guid("UserGUID")
            .code_name("UserName")
            .category(CATEGORY)
            .binding(USER_ROLE)
            .binding(USER_SITE),
    );
    registry.register(
        ObjectTypeDescriptor::new(ROLE, "RoleID")
            .guid("RoleGUID")
            .code_name("RoleName")
            .site("SiteID", SITE)
            .exclude("RoleNotes", "")
            .restorable(),
    );
    registry.register(
        ObjectTypeDescriptor::new(USER_ROLE, "UserRoleID")
            .parent("UserID", USER)
            .reference("RoleID", ROLE)
            .as_binding(),
    );
    registry.register(
        ObjectTypeDescriptor::new(USER_SITE, "UserSiteID")
            .parent("UserID", USER)
            .reference("SiteID", SITE)
            .as_site_binding(),
    );
    registry.register_with(
        ObjectTypeDescriptor::new(TAG_GROUP, "TagGroupID")
            .guid("TagGroupGUID")
            .code_name("TagGroupName")
            .site("TagGroupSiteID", SITE)
            .child(TAG)
            .exclude("TagGroupTagCount", 0),
        TagGroup::boxed,
    );
    registry.register(
        ObjectTypeDescriptor::new(TAG, "TagID")
            .guid("TagGUID")
            .code_name("TagName")
            .parent("TagGroupID", TAG_GROUP),
    );
    registry.register(
        ObjectTypeDescriptor::new(CATEGORY, "CategoryID")
            .guid("CategoryGUID")
            .code_name("CategoryName")
            .owner_reference("CategoryUserID", USER)
            .reference("CategoryParentID", CATEGORY),
    );
    registry
        .add_hook(
            TAG_GROUP,
            PostApplyHook::RecountChildren {
                child_type: TAG.into(),
                count_column: "TagGroupTagCount".into(),
            },
        )
        .expect("tag group is registered");
    registry
        .add_hook(
            TAG,
            PostApplyHook::NormalizeOrder {
                order_column: "TagOrder".into(),
            },
        )
        .expect("tag is registered");
    registry.set_user_type(USER);
    registry
}

/// Typed record for tag groups.
#[derive(Debug, Clone)]
pub struct TagGroup {
    descriptor: Arc<ObjectTypeDescriptor>,
    /// `TagGroupID`.
    pub id: Option<i64>,
    /// `TagGroupGUID`.
    pub guid: Option<Uuid>,
    /// `TagGroupName`.
    pub name: Option<String>,
    /// `TagGroupDisplayName`.
    pub display_name: Option<String>,
    /// `TagGroupSiteID`.
    pub site_id: Option<i64>,
    /// `TagGroupTagCount`.
    pub tag_count: i64,
}

impl TagGroup {
    /// Registry constructor.
    pub fn boxed(descriptor: Arc<ObjectTypeDescriptor>) -> Box<dyn StagedObject> {
        Box::new(Self {
            descriptor,
            id: None,
            guid: None,
            name: None,
            display_name: None,
            site_id: None,
            tag_count: 0,
        })
    }
}

fn text_of(column: &str, value: &Value) -> StagingResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s.clone())),
        other => Err(StagingError::structural(format!(
            "{column} expects text, got {other:?}"
        ))),
    }
}

impl StagedObject for TagGroup {
    fn descriptor(&self) -> &ObjectTypeDescriptor {
        &self.descriptor
    }

    fn get(&self, column: &str) -> Value {
        match column {
            "TagGroupID" => self.id.into(),
            "TagGroupGUID" => self.guid.into(),
            "TagGroupName" => self.name.clone().into(),
            "TagGroupDisplayName" => self.display_name.clone().into(),
            "TagGroupSiteID" => self.site_id.into(),
            "TagGroupTagCount" => self.tag_count.into(),
            _ => Value::Null,
        }
    }

    fn set(&mut self, column: &str, value: Value) {
        match column {
            "TagGroupID" => self.id = value.as_id(),
            "TagGroupGUID" => self.guid = value.as_guid(),
            "TagGroupName" => self.name = value.as_text().map(str::to_string),
            "TagGroupDisplayName" => self.display_name = value.as_text().map(str::to_string),
            "TagGroupSiteID" => self.site_id = value.as_id(),
            "TagGroupTagCount" => self.tag_count = value.as_integer().unwrap_or_default(),
            _ => {}
        }
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("TagGroupID", self.id)
            .with("TagGroupGUID", self.guid)
            .with("TagGroupName", self.name.clone())
            .with("TagGroupDisplayName", self.display_name.clone())
            .with("TagGroupSiteID", self.site_id)
            .with("TagGroupTagCount", self.tag_count)
    }

    fn load_row(&mut self, row: &Row) -> StagingResult<()> {
        for (column, value) in row.iter() {
            match column.as_str() {
                "TagGroupName" => self.name = text_of(column, value)?,
                "TagGroupDisplayName" => self.display_name = text_of(column, value)?,
                _ => self.set(column, value.clone()),
            }
        }
        Ok(())
    }
}

/// A [`Host`] whose collaborators are kept as concrete in-memory types so
/// tests can inspect them.
///
/// Starts with the sample schema, the [`MAIN_SITE`] site, the
/// [`ADMIN_USER`] user and a root document for the site.
pub struct TestHost {
    /// The host handed to the engine.
    pub host: Host,
    /// Object rows.
    pub objects: Arc<MemoryObjectStore>,
    /// Document tree.
    pub documents: Arc<MemoryDocumentRepository>,
    /// Workflows and versions.
    pub workflow: Arc<MemoryWorkflowService>,
    /// Binaries.
    pub blobs: Arc<MemoryBlobStore>,
    /// Touched cache keys.
    pub cache: Arc<MemoryCache>,
    /// Logged errors.
    pub events: Arc<MemoryEventLog>,
    /// Forward-replication records.
    pub replication: Arc<MemoryReplicationLog>,
    /// Identifier of [`MAIN_SITE`].
    pub site_id: i64,
    /// Identifier of [`ADMIN_USER`].
    pub admin_id: i64,
    /// The site root.
    pub root: DocumentNode,
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost {
    /// Creates a seeded host.
    pub fn new() -> Self {
        let objects = Arc::new(MemoryObjectStore::new());
        let documents = Arc::new(MemoryDocumentRepository::new());
        let workflow = Arc::new(MemoryWorkflowService::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let cache = Arc::new(MemoryCache::new());
        let events = Arc::new(MemoryEventLog::new());
        let replication = Arc::new(MemoryReplicationLog::new());
        let host = Host {
            registry: Arc::new(sample_registry()),
            objects: objects.clone(),
            documents: documents.clone(),
            workflow: workflow.clone(),
            blobs: blobs.clone(),
            cache: cache.clone(),
            events: events.clone(),
            replication: replication.clone(),
        };

        let site = Row::new()
            .with("SiteName", MAIN_SITE)
            .with("SiteGUID", Uuid::new_v4());
        let site_id = insert(&host, SITE, &site);
        let admin = Row::new()
            .with("UserName", ADMIN_USER)
            .with("UserGUID", Uuid::new_v4());
        let admin_id = insert(&host, USER, &admin);
        let root = documents.create_root(Some(site_id));

        Self {
            host,
            objects,
            documents,
            workflow,
            blobs,
            cache,
            events,
            replication,
            site_id,
            admin_id,
            root,
        }
    }

    /// A service targeting [`MAIN_SITE`].
    pub fn service(&self) -> StagingService {
        self.service_with(StagingConfig::new().target_site(MAIN_SITE))
    }

    /// A service with an explicit configuration.
    pub fn service_with(&self, config: StagingConfig) -> StagingService {
        StagingService::new(self.host.clone(), config)
    }

    /// Inserts a row directly into the target and returns its identifier.
    pub fn seed(&self, object_type: &str, row: Row) -> i64 {
        insert(&self.host, object_type, &row)
    }

    /// All target rows of a type.
    pub fn rows(&self, object_type: &str) -> Vec<Row> {
        self.objects.rows(object_type)
    }

    /// The single target row of a type whose `column` equals `value`.
    pub fn find(&self, object_type: &str, column: &str, value: impl Into<Value>) -> Option<Row> {
        let descriptor = self
            .host
            .registry
            .descriptor(object_type)
            .expect("registered type");
        let mut found = self
            .objects
            .find(&descriptor, &Row::new().with(column, value))
            .expect("memory store");
        assert!(found.len() <= 1, "{object_type}.{column} is not unique");
        found.pop()
    }

    /// Creates a folder document at `alias_path` under an existing parent.
    pub fn create_folder(&self, alias_path: &str, culture: &str) -> DocumentNode {
        let (parent_path, alias) = alias_path
            .rsplit_once('/')
            .expect("alias path starts with '/'");
        let parent_path = if parent_path.is_empty() { "/" } else { parent_path };
        let parent = self
            .documents
            .node_by_alias_path(Some(self.site_id), parent_path, None)
            .expect("memory tree")
            .expect("parent folder exists");
        let node = Row::new()
            .with(columns::NODE_GUID, Uuid::new_v4())
            .with(columns::NODE_ALIAS, alias)
            .with(columns::CLASS_NAME, "cms.folder")
            .with(columns::NODE_SITE_ID, self.site_id);
        let culture = Row::new()
            .with(columns::DOCUMENT_CULTURE, culture)
            .with(columns::DOCUMENT_NAME, alias);
        self.documents
            .insert_node(parent.node_id().expect("stored node"), &node, &culture)
            .expect("memory tree")
    }

    /// Looks a document up by GUID.
    pub fn document(&self, guid: Uuid, culture: Option<&str>) -> Option<DocumentNode> {
        self.documents
            .node_by_guid(None, guid, culture)
            .expect("memory tree")
    }
}

fn insert(host: &Host, object_type: &str, row: &Row) -> i64 {
    let descriptor = host.registry.descriptor(object_type).expect("registered type");
    host.objects
        .insert(&descriptor, row, None)
        .expect("memory store")
}
