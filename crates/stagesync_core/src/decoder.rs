//! Task payload decoding.

use crate::document::{
    ACL_ITEM_TYPE, ACL_TYPE, ALIAS_TYPE, ATTACHMENT_HISTORY_TABLE, ATTACHMENT_TYPE,
    DOCUMENT_CATEGORY_TYPE, DOCUMENT_TYPE, PAGE_TEMPLATE_TYPE, RELATIONSHIP_TYPE,
    VARIANT_TYPE, VERSION_HISTORY_TABLE,
};
use crate::error::{StagingError, StagingResult};
use crate::types::TaskKind;
use stagesync_codec::{BlobSet, ChangeSet, PARAMETERS_TABLE};

/// A task payload decoded into its typed shape.
#[derive(Debug, Clone)]
pub struct DecodedTask {
    /// Kind of change.
    pub kind: TaskKind,
    /// Object type or document class.
    pub object_type: String,
    /// Decoded tables; every table the kind may use is present, possibly empty.
    pub change_set: ChangeSet,
    /// Binary payloads.
    pub blobs: BlobSet,
}

/// Tables a task kind reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    /// Tables that must be present in the payload.
    pub required: Vec<String>,
    /// Tables that are read when present.
    pub optional: Vec<String>,
}

const DOCUMENT_SUBSTATE: &[&str] = &[
    ATTACHMENT_TYPE,
    ALIAS_TYPE,
    RELATIONSHIP_TYPE,
    DOCUMENT_CATEGORY_TYPE,
    PAGE_TEMPLATE_TYPE,
    ACL_TYPE,
    ACL_ITEM_TYPE,
    VARIANT_TYPE,
];

/// Returns the table shape of a task kind.
pub fn table_shape(kind: TaskKind, object_type: &str) -> TableShape {
    let owned = |names: &[&str]| names.iter().map(|n| (*n).to_string()).collect::<Vec<_>>();
    let mut optional = vec![PARAMETERS_TABLE.to_string()];
    let required = match kind {
        TaskKind::CreateObject
        | TaskKind::UpdateObject
        | TaskKind::DeleteObject
        | TaskKind::AddToSite
        | TaskKind::RemoveFromSite => vec![object_type.to_string()],
        TaskKind::CreateDocument | TaskKind::UpdateDocument => {
            optional.extend(owned(DOCUMENT_SUBSTATE));
            vec![DOCUMENT_TYPE.to_string()]
        }
        TaskKind::PublishDocument => {
            optional.extend(owned(DOCUMENT_SUBSTATE));
            optional.extend(owned(&[VERSION_HISTORY_TABLE, ATTACHMENT_HISTORY_TABLE]));
            vec![DOCUMENT_TYPE.to_string()]
        }
        TaskKind::BreakAclInheritance | TaskKind::RestoreAclInheritance => {
            optional.extend(owned(&[ACL_TYPE, ACL_ITEM_TYPE]));
            vec![DOCUMENT_TYPE.to_string()]
        }
        TaskKind::DeleteDocument
        | TaskKind::DeleteAllCultures
        | TaskKind::ArchiveDocument
        | TaskKind::RejectDocument
        | TaskKind::MoveDocument => vec![DOCUMENT_TYPE.to_string()],
    };
    TableShape { required, optional }
}

/// Decodes a task payload and its optional binary payload.
///
/// # Errors
///
/// Returns a structural error when either payload does not parse or when a
/// table required by `kind` is missing.
pub fn decode_task(
    kind: TaskKind,
    object_type: &str,
    payload: &[u8],
    binary_payload: Option<&[u8]>,
) -> StagingResult<DecodedTask> {
    let mut change_set = ChangeSet::decode(payload)
        .map_err(|e| StagingError::structural(format!("unreadable payload: {e}")))?;

    let shape = table_shape(kind, object_type);
    if let Some(missing) = shape.required.iter().find(|t| !change_set.has_table(t)) {
        return Err(StagingError::structural(format!(
            "{kind} task for {object_type} is missing table '{missing}'"
        )));
    }
    for table in &shape.optional {
        change_set.ensure_table(table);
    }

    let blobs = match binary_payload {
        Some(bytes) if !bytes.is_empty() => BlobSet::decode(bytes)
            .map_err(|e| StagingError::structural(format!("unreadable binary payload: {e}")))?,
        _ => BlobSet::new(),
    };

    Ok(DecodedTask {
        kind,
        object_type: object_type.to_string(),
        change_set,
        blobs,
    })
}
