//! Per-task processing context.

use crate::config::StagingConfig;
use crate::decoder::DecodedTask;
use crate::document::{self, DOCUMENT_TYPE, NODE_TYPE};
use crate::error::{StagingError, StagingResult};
use crate::host::{Host, ReplicationRecord};
use crate::object::ObjectTypeDescriptor;
use crate::observer::{AppliedObject, TaskObserver, TaskOutcome};
use crate::sync::{self, MergeOverride, PostProcessQueue};
use crate::translation::{SeedResolver, TranslationTable};
use crate::types::{GroupRef, ProcessOptions, SourceUser, TaskKind};
use stagesync_codec::{Row, TranslationSeed, Value};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Who and what a task carries besides its payload.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TaskOrigin<'a> {
    pub source_user: Option<&'a SourceUser>,
    pub task_groups: &'a [GroupRef],
}

/// State of one task being processed.
///
/// Built once per task and passed explicitly through every step. Rows are
/// read from the immutable decoded task; identifiers flow through the
/// translation table.
pub(crate) struct Engine<'a> {
    pub host: &'a Host,
    pub config: &'a StagingConfig,
    pub task: &'a DecodedTask,
    pub origin: TaskOrigin<'a>,
    pub options: ProcessOptions,
    pub observer: &'a dyn TaskObserver,
    pub merge_override: &'a dyn MergeOverride,
    pub translations: TranslationTable,
    pub post_queue: PostProcessQueue,
    pub site_id: Option<i64>,
    pub outcome: TaskOutcome,
}

impl<'a> Engine<'a> {
    pub fn new(
        host: &'a Host,
        config: &'a StagingConfig,
        task: &'a DecodedTask,
        origin: TaskOrigin<'a>,
        options: ProcessOptions,
        observer: &'a dyn TaskObserver,
        merge_override: &'a dyn MergeOverride,
    ) -> StagingResult<Self> {
        let site_id = match &config.target_site {
            Some(name) => Some(site_id_by_name(host, name)?.ok_or_else(|| {
                StagingError::dependency_not_found(format!("target site '{name}' does not exist"))
            })?),
            None => None,
        };
        let mut engine = Self {
            host,
            config,
            task,
            origin,
            options,
            observer,
            merge_override,
            translations: TranslationTable::seeded(&task.change_set.translations),
            post_queue: PostProcessQueue::default(),
            site_id,
            outcome: TaskOutcome::default(),
        };
        engine.push_fallback_user()?;
        Ok(engine)
    }

    /// The task kind.
    pub fn kind(&self) -> TaskKind {
        self.task.kind
    }

    /// Runs the task and returns its outcome.
    pub fn run(mut self) -> StagingResult<TaskOutcome> {
        let kind = self.kind();
        let object = if kind.is_document_task() {
            document::apply(&mut self)?
        } else {
            match kind {
                TaskKind::CreateObject | TaskKind::UpdateObject => sync::apply_object_task(&mut self)?,
                TaskKind::DeleteObject => {
                    sync::delete_object_task(&mut self)?;
                    None
                }
                TaskKind::AddToSite => sync::add_to_site(&mut self)?,
                TaskKind::RemoveFromSite => {
                    sync::remove_from_site(&mut self)?;
                    None
                }
                other => {
                    return Err(StagingError::not_supported(format!(
                        "{other} is not an object task"
                    )))
                }
            }
        };
        sync::process_post_queue(&mut self)?;
        self.pop_fallback_user();
        let mut outcome = std::mem::take(&mut self.outcome);
        outcome.object = object;
        Ok(outcome)
    }

    fn push_fallback_user(&mut self) -> StagingResult<()> {
        let Some(user_type) = self.host.registry.user_type() else {
            return Ok(());
        };
        let descriptor = self.host.registry.descriptor(user_type)?;
        let Some(code_column) = &descriptor.code_name_column else {
            return Ok(());
        };
        let criteria = Row::new().with(code_column.clone(), self.config.fallback_user.as_str());
        let found = self.host.objects.find(&descriptor, &criteria)?;
        if let Some(id) = found.first().and_then(|r| r.id(&descriptor.id_column)) {
            trace!(user = %self.config.fallback_user, id, "fallback user active");
            self.translations.set_default(user_type, id);
        }
        Ok(())
    }

    fn pop_fallback_user(&mut self) {
        if let Some(user_type) = self.host.registry.user_type() {
            self.translations.clear_default(user_type);
        }
    }

    /// Translates one source identifier.
    pub fn translate_id(&mut self, object_type: &str, source_id: i64) -> StagingResult<Option<i64>> {
        let resolver = HostResolver {
            host: self.host,
            site_id: self.site_id,
        };
        self.translations.get_target_id(object_type, source_id, &resolver)
    }

    /// Translates one source identifier, ignoring any active default.
    pub fn resolve_id(&mut self, object_type: &str, source_id: i64) -> StagingResult<Option<i64>> {
        let resolver = HostResolver {
            host: self.host,
            site_id: self.site_id,
        };
        self.translations.resolve(object_type, source_id, &resolver)
    }

    /// Rewrites every foreign reference of `row` to target identifiers.
    ///
    /// Returns the required columns that did not resolve. Optional columns
    /// that do not resolve are cleared.
    pub fn translate_columns(
        &mut self,
        descriptor: &ObjectTypeDescriptor,
        row: &mut Row,
    ) -> StagingResult<Vec<String>> {
        let mut failed = Vec::new();
        for reference in &descriptor.references {
            let Some(source_id) = row.id(&reference.column) else {
                continue;
            };
            let stamp_site = descriptor.site_column.as_deref() == Some(reference.column.as_str())
                && self.stamps_site();
            if stamp_site {
                row.set(reference.column.clone(), self.site_id);
                continue;
            }
            let translated = if reference.fallback {
                self.translate_id(&reference.target_type, source_id)?
            } else {
                self.resolve_id(&reference.target_type, source_id)?
            };
            match translated {
                Some(target_id) => row.set(reference.column.clone(), target_id),
                None if reference.required => failed.push(reference.column.clone()),
                None => row.set(reference.column.clone(), Value::Null),
            }
        }
        if !failed.is_empty() {
            debug!(object_type = %descriptor.object_type, ?failed, "unresolved references");
        }
        Ok(failed)
    }

    /// Site-scoped objects take the target site, except while replaying
    /// version history.
    fn stamps_site(&self) -> bool {
        self.site_id.is_some() && self.kind() != TaskKind::PublishDocument
    }

    /// Finds the target row an incoming (already translated) row stands for.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousMatch` when more than one row matches.
    pub fn find_existing(
        &self,
        descriptor: &ObjectTypeDescriptor,
        row: &Row,
    ) -> StagingResult<Option<Row>> {
        for criteria in identity_criteria(descriptor, row) {
            let mut found = self.host.objects.find(descriptor, &criteria)?;
            match found.len() {
                0 => continue,
                1 => return Ok(found.pop()),
                count => {
                    return Err(StagingError::AmbiguousMatch {
                        object_type: descriptor.object_type.clone(),
                        count,
                    })
                }
            }
        }
        Ok(None)
    }

    /// Notifies cache dependencies of a changed object.
    pub fn touch_object(&self, object_type: &str, id: i64) {
        self.host.cache.touch(&[
            format!("{object_type}|byid|{id}"),
            format!("{object_type}|all"),
        ]);
    }

    /// Notifies cache dependencies of a changed document.
    pub fn touch_node(&self, guid: Option<Uuid>, document_id: Option<i64>) {
        let mut keys = Vec::new();
        if let Some(guid) = guid {
            keys.push(format!("node|{guid}"));
        }
        if let Some(id) = document_id {
            keys.push(format!("{DOCUMENT_TYPE}|byid|{id}"));
        }
        keys.push(format!("{DOCUMENT_TYPE}|all"));
        self.host.cache.touch(&keys);
    }

    /// Appends a forward-replication record unless logging is off.
    pub fn log_replication(
        &self,
        object_type: &str,
        target_id: i64,
        guid: Option<Uuid>,
        site_id: Option<i64>,
    ) -> StagingResult<()> {
        if self.options.suppress_logging || !self.config.log_synchronization {
            return Ok(());
        }
        self.host.replication.append(ReplicationRecord {
            task_kind: self.kind(),
            object_type: object_type.to_string(),
            target_id,
            guid,
            site_id,
            source_user: self.origin.source_user.cloned(),
            task_groups: self.origin.task_groups.to_vec(),
        })
    }

    /// Counts and reports an applied object.
    pub fn record_applied(&mut self, object_type: &str, target_id: i64) {
        self.outcome.applied += 1;
        self.observer.on_applied(object_type, target_id);
        debug!(object_type, target_id, "applied");
    }

    /// Counts and reports a deleted object.
    pub fn record_deleted(&mut self, object_type: &str, target_id: i64) {
        self.outcome.deleted += 1;
        self.observer.on_deleted(object_type, target_id);
        debug!(object_type, target_id, "deleted");
    }

    /// Builds the root description of an applied object.
    pub fn applied_object(
        &self,
        descriptor: &ObjectTypeDescriptor,
        target_id: i64,
    ) -> StagingResult<AppliedObject> {
        let guid = match &descriptor.guid_column {
            Some(column) => self
                .host
                .objects
                .get(descriptor, target_id)?
                .and_then(|r| r.guid(column)),
            None => None,
        };
        Ok(AppliedObject {
            object_type: descriptor.object_type.clone(),
            target_id,
            guid,
            culture: None,
        })
    }

    /// Descriptor lookup.
    pub fn descriptor(&self, object_type: &str) -> StagingResult<Arc<ObjectTypeDescriptor>> {
        self.host.registry.descriptor(object_type)
    }
}

/// Candidate lookups identifying a row, most specific first.
///
/// Code name within site, parent and group; then GUID; bindings match on all
/// their references.
pub(crate) fn identity_criteria(descriptor: &ObjectTypeDescriptor, row: &Row) -> Vec<Row> {
    let mut candidates = Vec::new();
    if let Some(code_column) = &descriptor.code_name_column {
        if let Some(code_name) = row.text(code_column) {
            let mut criteria = Row::new().with(code_column.clone(), code_name);
            let scope = [
                descriptor.site_column.as_ref(),
                descriptor.parent.as_ref().map(|p| &p.column),
                descriptor.group.as_ref().map(|g| &g.column),
            ];
            for column in scope.into_iter().flatten() {
                criteria.set(column.clone(), row.get(column).clone());
            }
            candidates.push(criteria);
        }
    }
    if let Some(guid_column) = &descriptor.guid_column {
        if let Some(guid) = row.guid(guid_column) {
            candidates.push(Row::new().with(guid_column.clone(), guid));
        }
    }
    if candidates.is_empty() && descriptor.is_binding {
        let criteria: Row = descriptor
            .references
            .iter()
            .map(|r| (r.column.clone(), row.get(&r.column).clone()))
            .collect();
        if !criteria.is_empty() {
            candidates.push(criteria);
        }
    }
    candidates
}

/// Looks a site up by code name.
pub(crate) fn site_id_by_name(host: &Host, name: &str) -> StagingResult<Option<i64>> {
    let Some(site) = host.registry.site_type() else {
        return Ok(None);
    };
    let Some(code_column) = &site.code_name_column else {
        return Ok(None);
    };
    let found = host
        .objects
        .find(site, &Row::new().with(code_column.clone(), name))?;
    Ok(found.first().and_then(|r| r.id(&site.id_column)))
}

/// Resolves translation seeds against the target.
struct HostResolver<'a> {
    host: &'a Host,
    site_id: Option<i64>,
}

impl SeedResolver for HostResolver<'_> {
    fn resolve(
        &self,
        table: &mut TranslationTable,
        seed: &TranslationSeed,
    ) -> StagingResult<Option<i64>> {
        match seed.object_type.as_str() {
            NODE_TYPE => {
                let Some(guid) = seed.guid else { return Ok(None) };
                Ok(self
                    .host
                    .documents
                    .node_by_guid(None, guid, None)?
                    .and_then(|n| n.node_id()))
            }
            DOCUMENT_TYPE => {
                let (Some(guid), Some(culture)) = (seed.guid, seed.code_name.as_deref()) else {
                    return Ok(None);
                };
                Ok(self
                    .host
                    .documents
                    .node_by_guid(None, guid, Some(culture))?
                    .and_then(|n| n.document_id()))
            }
            object_type => {
                let Ok(descriptor) = self.host.registry.descriptor(object_type) else {
                    return Ok(None);
                };
                self.resolve_object(table, &descriptor, seed)
            }
        }
    }
}

impl HostResolver<'_> {
    fn resolve_object(
        &self,
        table: &mut TranslationTable,
        descriptor: &ObjectTypeDescriptor,
        seed: &TranslationSeed,
    ) -> StagingResult<Option<i64>> {
        let mut criteria = Row::new();
        match (&descriptor.guid_column, seed.guid, &descriptor.code_name_column, &seed.code_name) {
            (Some(column), Some(guid), _, _) => criteria.set(column.clone(), guid),
            (_, _, Some(column), Some(code_name)) => {
                criteria.set(column.clone(), code_name.as_str());
                if let Some(site_column) = &descriptor.site_column {
                    let site = match (&seed.site_name, self.site_id) {
                        (None, _) => None,
                        (Some(_), Some(target)) => Some(target),
                        (Some(name), None) => match site_id_by_name(self.host, name)? {
                            Some(id) => Some(id),
                            None => return Ok(None),
                        },
                    };
                    criteria.set(site_column.clone(), site);
                }
                if let (Some(group), Some(group_source)) = (&descriptor.group, seed.group_id) {
                    match table.get_target_id(&group.target_type, group_source, self)? {
                        Some(id) => criteria.set(group.column.clone(), id),
                        None => return Ok(None),
                    }
                }
            }
            _ => return Ok(None),
        }

        let found = self.host.objects.find(descriptor, &criteria)?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found[0].id(&descriptor.id_column)),
            count => Err(StagingError::AmbiguousMatch {
                object_type: descriptor.object_type.clone(),
                count,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_scoped_code_name() {
        let desc = ObjectTypeDescriptor::new("cms.tag", "TagID")
            .guid("TagGUID")
            .code_name("TagName")
            .site("TagSiteID", "cms.site")
            .parent("TagGroupID", "cms.taggroup");
        let guid = Uuid::new_v4();
        let row = Row::new()
            .with("TagName", "red")
            .with("TagGroupID", 4)
            .with("TagGUID", guid);

        let candidates = identity_criteria(&desc, &row);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].text("TagName"), Some("red"));
        assert_eq!(candidates[0].id("TagGroupID"), Some(4));
        assert!(candidates[0].contains("TagSiteID"));
        assert!(candidates[0].get("TagSiteID").is_null());
        assert_eq!(candidates[1].guid("TagGUID"), Some(guid));
    }

    #[test]
    fn bindings_match_on_references() {
        let desc = ObjectTypeDescriptor::new("cms.userrole", "UserRoleID")
            .parent("UserID", "cms.user")
            .reference("RoleID", "cms.role")
            .as_binding();
        let candidates = identity_criteria(&desc, &Row::new().with("UserID", 1).with("RoleID", 2));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].len(), 2);
    }
}
