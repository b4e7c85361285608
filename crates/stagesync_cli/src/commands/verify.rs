//! Verify command implementation.

use crate::task_file::TaskFile;
use stagesync_codec::{BlobKey, BlobSet, ChangeSet};
use stagesync_core::document::columns::ATTACHMENT_GUID;
use stagesync_core::document::{ATTACHMENT_HISTORY_TABLE, ATTACHMENT_TYPE};
use stagesync_core::{table_shape, TaskKind};
use std::collections::BTreeSet;
use std::path::Path;

const ATTACHMENT_EXTENSION: &str = "AttachmentExtension";

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of tables checked.
    pub tables_checked: usize,
    /// Problems that make the task fail on any target.
    pub errors: Vec<String>,
    /// Suspicious content that does not fail the task by itself.
    pub warnings: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(
    path: &Path,
    kind: Option<TaskKind>,
    object_type: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying task file {:?}", path);
    println!();

    let file = TaskFile::read(path)?;
    let kind = kind.unwrap_or(file.kind);
    let object_type = object_type.unwrap_or(&file.object_type);
    if kind != file.kind || object_type != file.object_type {
        println!(
            "Checking as {kind} {object_type} (recorded as {} {})",
            file.kind, file.object_type
        );
    }

    let result = verify(&file, kind, object_type);
    println!("  tables checked: {}", result.tables_checked);
    for warning in &result.warnings {
        println!("    WARNING: {}", warning);
    }
    for error in &result.errors {
        println!("    ERROR: {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Task verification passed");
        Ok(())
    } else {
        println!("✗ Task verification failed");
        Err("Verification failed".into())
    }
}

/// Checks a task file as a task of `kind` for `object_type`.
pub fn verify(file: &TaskFile, kind: TaskKind, object_type: &str) -> VerifyResult {
    let mut result = VerifyResult::default();

    let change_set = match ChangeSet::decode(&file.payload) {
        Ok(change_set) => change_set,
        Err(e) => {
            result.errors.push(format!("Unreadable payload: {e}"));
            return result;
        }
    };
    let blobs = match file.binary_payload.as_deref() {
        Some(bytes) if !bytes.is_empty() => match BlobSet::decode(bytes) {
            Ok(blobs) => blobs,
            Err(e) => {
                result.errors.push(format!("Unreadable binary payload: {e}"));
                BlobSet::new()
            }
        },
        _ => BlobSet::new(),
    };

    let shape = table_shape(kind, object_type);
    for table in &shape.required {
        result.tables_checked += 1;
        match change_set.table(table) {
            None => result
                .errors
                .push(format!("Missing table '{table}' required by {kind}")),
            Some(t) if t.is_empty() => result
                .errors
                .push(format!("Table '{table}' required by {kind} has no rows")),
            Some(_) => {}
        }
    }
    for name in change_set.tables.keys() {
        if shape.required.contains(name) || shape.optional.contains(name) {
            continue;
        }
        result.tables_checked += 1;
        if kind.is_document_task() {
            result
                .warnings
                .push(format!("Table '{name}' is not read by {kind}"));
        }
    }

    // Attachments travel with their binaries; history rows may reuse them.
    let mut referenced = BTreeSet::new();
    for row in change_set.rows(ATTACHMENT_TYPE) {
        let Some(guid) = row.guid(ATTACHMENT_GUID) else {
            result
                .warnings
                .push(format!("Attachment row without {ATTACHMENT_GUID}"));
            continue;
        };
        let key = BlobKey::new(guid, row.text(ATTACHMENT_EXTENSION).unwrap_or_default());
        if blobs.get(&key).is_none() {
            result
                .warnings
                .push(format!("Attachment {key} has no binary payload"));
        }
        referenced.insert(key);
    }
    for row in change_set.rows(ATTACHMENT_HISTORY_TABLE) {
        if let Some(guid) = row.guid(ATTACHMENT_GUID) {
            referenced.insert(BlobKey::new(
                guid,
                row.text(ATTACHMENT_EXTENSION).unwrap_or_default(),
            ));
        }
    }
    for (key, _) in blobs.iter() {
        if !referenced.contains(key) {
            result
                .warnings
                .push(format!("Binary {key} belongs to no attachment"));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagesync_codec::Row;
    use stagesync_core::ChangeTask;
    use uuid::Uuid;

    fn file(kind: TaskKind, object_type: &str, change_set: &ChangeSet) -> TaskFile {
        TaskFile::from(ChangeTask::new(kind, object_type, change_set.encode().unwrap()))
    }

    #[test]
    fn object_task_needs_its_table() {
        let cs = ChangeSet::new().with_row("cms.tag", Row::new().with("TagID", 1));
        let ok = verify(&file(TaskKind::UpdateObject, "cms.tag", &cs), TaskKind::UpdateObject, "cms.tag");
        assert!(ok.is_ok());

        let wrong = verify(
            &file(TaskKind::UpdateObject, "cms.tag", &cs),
            TaskKind::UpdateObject,
            "cms.taggroup",
        );
        assert!(!wrong.is_ok());
        assert!(wrong.errors[0].contains("cms.taggroup"));
    }

    #[test]
    fn empty_required_table_fails() {
        let mut cs = ChangeSet::new();
        cs.ensure_table("cms.document");
        let result = verify(
            &file(TaskKind::DeleteDocument, "cms.article", &cs),
            TaskKind::DeleteDocument,
            "cms.article",
        );
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn attachment_binaries_are_matched() {
        let (with_blob, without_blob, stray) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let cs = ChangeSet::new()
            .with_row("cms.document", Row::new().with("NodeGUID", Uuid::new_v4()))
            .with_row(
                ATTACHMENT_TYPE,
                Row::new()
                    .with(ATTACHMENT_GUID, with_blob)
                    .with("AttachmentExtension", ".png"),
            )
            .with_row(ATTACHMENT_TYPE, Row::new().with(ATTACHMENT_GUID, without_blob));
        let blobs = BlobSet::new()
            .with(BlobKey::new(with_blob, "png"), vec![1])
            .with(BlobKey::new(stray, "txt"), vec![2]);
        let mut task_file = file(TaskKind::UpdateDocument, "cms.article", &cs);
        task_file.binary_payload = Some(blobs.encode().unwrap());

        let result = verify(&task_file, TaskKind::UpdateDocument, "cms.article");
        assert!(result.is_ok());
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings.iter().any(|w| w.contains(&without_blob.to_string())));
        assert!(result.warnings.iter().any(|w| w.contains(&stray.to_string())));
    }

    #[test]
    fn unreadable_payload_is_an_error() {
        let mut task_file = file(TaskKind::UpdateObject, "cms.tag", &ChangeSet::new());
        task_file.payload = vec![0xff, 0x00];
        let result = verify(&task_file, TaskKind::UpdateObject, "cms.tag");
        assert!(result.errors[0].starts_with("Unreadable payload"));
    }
}
