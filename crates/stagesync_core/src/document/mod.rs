//! Document tree synchronization.
//!
//! Documents are matched by node GUID (the site root by position). Each
//! task kind writes the node and culture version, then brings attachments,
//! aliases, relationships, categories, variants, the access-control list
//! and the workflow state in line with the source.

mod acl;
mod node;
mod substate;
mod tree;
mod workflow;

pub use node::columns::{self, PARAM_SITE_NAME};
pub use node::{
    builtin_descriptors, child_path, parent_path, split_document_row, DocumentNode, ACL_ITEM_TYPE,
    ACL_TYPE, ALIAS_TYPE, ATTACHMENT_HISTORY_TABLE, ATTACHMENT_TYPE, CATEGORY_TYPE,
    DOCUMENT_CATEGORY_TYPE, DOCUMENT_TYPE, NODE_TYPE, PAGE_TEMPLATE_TYPE, RELATIONSHIP_TYPE,
    ROLE_TYPE, USER_TYPE, VARIANT_TYPE, VERSION_HISTORY_TABLE,
};

use crate::engine::Engine;
use crate::error::{StagingError, StagingResult};
use crate::observer::AppliedObject;
use crate::types::TaskKind;

/// Runs a document task. Returns the document it leaves behind, if any.
pub(crate) fn apply(engine: &mut Engine<'_>) -> StagingResult<Option<AppliedObject>> {
    match engine.kind() {
        TaskKind::CreateDocument | TaskKind::UpdateDocument => {
            tree::create_or_update(engine).map(Some)
        }
        TaskKind::PublishDocument => workflow::publish(engine).map(Some),
        TaskKind::ArchiveDocument | TaskKind::RejectDocument => workflow::change_step(engine),
        TaskKind::MoveDocument => tree::move_document(engine).map(Some),
        TaskKind::DeleteDocument => tree::delete_document(engine, false).map(|()| None),
        TaskKind::DeleteAllCultures => tree::delete_document(engine, true).map(|()| None),
        TaskKind::BreakAclInheritance | TaskKind::RestoreAclInheritance => {
            acl::apply_inheritance_task(engine).map(Some)
        }
        other => Err(StagingError::not_supported(format!(
            "{other} is not a document task"
        ))),
    }
}
