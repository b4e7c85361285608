//! Child and binding reconciliation under a merge policy.

use super::object::{delete_row, update_object};
use super::post_process::PostProcessEntry;
use super::site_binding;
use crate::engine::Engine;
use crate::error::StagingResult;
use crate::object::ObjectTypeDescriptor;
use crate::types::{MergePolicy, SyncOutcome, TaskKind};
use stagesync_codec::Row;
use tracing::{debug, trace};

/// Adjusts the merge policy of one (parent, related type) pair for a task.
pub trait MergeOverride: Send + Sync {
    /// Returns the policy to apply; `computed` comes from the parent's
    /// descriptor.
    fn merge_policy(
        &self,
        kind: TaskKind,
        parent_type: &str,
        related_type: &str,
        computed: MergePolicy,
    ) -> MergePolicy;
}

/// Keeps the descriptor's policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityOverride;

impl MergeOverride for IdentityOverride {
    fn merge_policy(&self, _: TaskKind, _: &str, _: &str, computed: MergePolicy) -> MergePolicy {
        computed
    }
}

impl<F> MergeOverride for F
where
    F: Fn(TaskKind, &str, &str, MergePolicy) -> MergePolicy + Send + Sync,
{
    fn merge_policy(
        &self,
        kind: TaskKind,
        parent_type: &str,
        related_type: &str,
        computed: MergePolicy,
    ) -> MergePolicy {
        self(kind, parent_type, related_type, computed)
    }
}

/// Applies the categories, children and bindings of a just-persisted parent.
///
/// Categories are upserted only. Children and bindings follow the parent's
/// merge policy for the task kind, after the merge override.
pub(crate) fn process_related(
    engine: &mut Engine<'_>,
    parent: &ObjectTypeDescriptor,
    source_parent_id: i64,
    target_parent_id: i64,
    depth: usize,
) -> StagingResult<()> {
    let scope = ParentScope {
        parent,
        source_id: source_parent_id,
        target_id: target_parent_id,
        depth,
    };
    for category in &parent.categories {
        reconcile(engine, &scope, category, MergePolicy::Partial)?;
    }

    let kind = engine.kind();
    let computed = parent.merge_policy_for(kind);
    for related in parent.children.iter().chain(&parent.bindings) {
        let policy = engine
            .merge_override
            .merge_policy(kind, &parent.object_type, related, computed);
        if policy == MergePolicy::None {
            trace!(parent = %parent.object_type, related, "merge policy none; skipped");
            continue;
        }
        reconcile(engine, &scope, related, policy)?;
    }
    Ok(())
}

/// The parent a set of related rows hangs from.
pub(crate) struct ParentScope<'p> {
    pub parent: &'p ObjectTypeDescriptor,
    pub source_id: i64,
    pub target_id: i64,
    pub depth: usize,
}

fn reconcile(
    engine: &mut Engine<'_>,
    scope: &ParentScope<'_>,
    related_type: &str,
    policy: MergePolicy,
) -> StagingResult<()> {
    let related = engine.descriptor(related_type)?;
    let parent_column = related
        .parent_column_for(&scope.parent.object_type)?
        .to_string();
    if related.is_site_binding {
        return site_binding::apply_site_bindings(engine, scope, &related, &parent_column);
    }

    // The source did not export this relation; leave the target as is.
    if !engine.task.change_set.has_table(related_type) {
        trace!(related = related_type, "table not in change-set; skipped");
        return Ok(());
    }

    let complete = policy == MergePolicy::Complete;
    let mut existing = if complete {
        engine
            .host
            .objects
            .find(&related, &Row::new().with(parent_column.clone(), scope.target_id))?
    } else {
        Vec::new()
    };

    let task = engine.task;
    for (index, row) in task.change_set.rows(related_type).iter().enumerate() {
        if row.id(&parent_column) != Some(scope.source_id) {
            continue;
        }
        if complete {
            existing.retain(|candidate| !same_identity(&related, row, candidate));
        }
        match update_object(engine, &related, row, false, scope.depth + 1)? {
            SyncOutcome::Applied(id) => {
                existing.retain(|candidate| candidate.id(&related.id_column) != Some(id));
            }
            SyncOutcome::Deferred(columns) => engine.post_queue.push(PostProcessEntry {
                object_type: related.object_type.clone(),
                index,
                depth: scope.depth + 1,
                columns,
            }),
            SyncOutcome::Skipped => {}
        }
    }

    if !existing.is_empty() {
        debug!(
            related = %related.object_type,
            count = existing.len(),
            "removing rows absent from source"
        );
    }
    for row in existing {
        delete_row(engine, &related, &row)?;
    }
    Ok(())
}

/// GUID or code name equality between a source row and a target row.
fn same_identity(descriptor: &ObjectTypeDescriptor, source: &Row, target: &Row) -> bool {
    if let Some(column) = &descriptor.guid_column {
        if let Some(guid) = source.guid(column) {
            return target.guid(column) == Some(guid);
        }
    }
    let Some(column) = &descriptor.code_name_column else {
        return false;
    };
    match source.text(column) {
        Some(code_name) => target.text(column) == Some(code_name),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn identity_override_keeps_policy() {
        let policy = IdentityOverride.merge_policy(
            TaskKind::UpdateObject,
            "cms.user",
            "cms.userrole",
            MergePolicy::Partial,
        );
        assert_eq!(policy, MergePolicy::Partial);
    }

    #[test]
    fn closures_override() {
        let narrow = |_: TaskKind, _: &str, related: &str, computed: MergePolicy| {
            if related == "cms.userrole" {
                MergePolicy::None
            } else {
                computed
            }
        };
        let hook: &dyn MergeOverride = &narrow;
        assert_eq!(
            hook.merge_policy(TaskKind::UpdateObject, "cms.user", "cms.userrole", MergePolicy::Complete),
            MergePolicy::None
        );
        assert_eq!(
            hook.merge_policy(TaskKind::UpdateObject, "cms.user", "cms.usersite", MergePolicy::Complete),
            MergePolicy::Complete
        );
    }

    #[test]
    fn identity_by_guid_then_code_name() {
        let desc = ObjectTypeDescriptor::new("cms.tag", "TagID")
            .guid("TagGUID")
            .code_name("TagName");
        let guid = Uuid::new_v4();
        let source = Row::new().with("TagGUID", guid).with("TagName", "red");
        assert!(same_identity(&desc, &source, &Row::new().with("TagGUID", guid)));
        // GUID wins over a matching code name.
        assert!(!same_identity(
            &desc,
            &source,
            &Row::new().with("TagGUID", Uuid::new_v4()).with("TagName", "red")
        ));

        let by_name = Row::new().with("TagName", "red");
        assert!(same_identity(&desc, &by_name, &Row::new().with("TagName", "red")));
        assert!(!same_identity(&desc, &by_name, &Row::new().with("TagName", "blue")));
    }
}
