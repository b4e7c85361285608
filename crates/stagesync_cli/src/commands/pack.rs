//! Pack command implementation.
//!
//! Turns a JSON task description into a task file:
//!
//! ```json
//! {
//!   "kind": "UpdateObject",
//!   "object_type": "cms.taggroup",
//!   "source_user": { "guid": "…", "name": "jane" },
//!   "tables": { "cms.taggroup": [ { "TagGroupID": 7, "TagGroupName": "colors" } ] },
//!   "parameters": { "SiteName": "corporate" },
//!   "translations": [ { "object_type": "cms.site", "source_id": 70, "code_name": "corporate" } ],
//!   "blobs": [ { "guid": "…", "extension": "png", "path": "logo.png" } ]
//! }
//! ```
//!
//! Blob paths are relative to the description file.

use crate::task_file::TaskFile;
use serde::Deserialize;
use stagesync_codec::{BlobKey, BlobSet, ChangeSet, Row, TranslationSeed, PARAMETERS_TABLE};
use stagesync_core::{decode_task, ChangeTask, GroupRef, SourceUser, TaskKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// A task described in JSON.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDescription {
    /// Task kind name, e.g. `UpdateObject` or `BreakACLInheritance`.
    pub kind: String,
    /// Object type or document class.
    pub object_type: String,
    /// Author on the source.
    #[serde(default)]
    pub source_user: Option<SourceUser>,
    /// Task groups.
    #[serde(default)]
    pub task_groups: Vec<GroupRef>,
    /// Rows per table.
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Row>>,
    /// Task parameters.
    #[serde(default)]
    pub parameters: Option<Row>,
    /// Translation seeds.
    #[serde(default)]
    pub translations: Vec<TranslationSeed>,
    /// Binary payloads read from disk.
    #[serde(default)]
    pub blobs: Vec<BlobSource>,
}

/// One binary payload of a description.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlobSource {
    /// GUID of the owning row.
    pub guid: Uuid,
    /// File extension.
    #[serde(default)]
    pub extension: String,
    /// File holding the data.
    pub path: PathBuf,
}

/// Runs the pack command.
pub fn run(input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(input)
        .map_err(|e| format!("cannot read {}: {e}", input.display()))?;
    let description: TaskDescription = serde_json::from_str(&text)?;
    let base = input.parent().unwrap_or_else(|| Path::new("."));

    let task = build_task(description, base)?;
    let file = TaskFile::from(task);
    file.write(output)?;

    info!(
        kind = %file.kind,
        object_type = %file.object_type,
        bytes = file.payload.len(),
        "task file written to {}",
        output.display()
    );
    Ok(())
}

/// Builds the task a description stands for and checks that it decodes.
pub fn build_task(
    description: TaskDescription,
    base: &Path,
) -> Result<ChangeTask, Box<dyn std::error::Error>> {
    let kind: TaskKind = description.kind.parse()?;

    let mut change_set = ChangeSet::new();
    for (name, rows) in description.tables {
        change_set.ensure_table(&name);
        for row in rows {
            change_set.add_row(&name, row);
        }
    }
    if let Some(parameters) = description.parameters {
        change_set.add_row(PARAMETERS_TABLE, parameters);
    }
    for seed in description.translations {
        change_set.add_seed(seed);
    }

    let mut blobs = BlobSet::new();
    for blob in &description.blobs {
        let path = base.join(&blob.path);
        let data =
            std::fs::read(&path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        debug!(guid = %blob.guid, bytes = data.len(), "blob added");
        blobs.insert(BlobKey::new(blob.guid, &blob.extension), data);
    }

    let payload = change_set.encode()?;
    let binary = if blobs.is_empty() {
        None
    } else {
        Some(blobs.encode()?)
    };
    decode_task(kind, &description.object_type, &payload, binary.as_deref())?;

    let mut task = ChangeTask::new(kind, description.object_type, payload);
    task.binary_payload = binary;
    task.source_user = description.source_user;
    task.task_groups = description.task_groups;
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn describe(json: &str) -> TaskDescription {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn packs_tables_seeds_and_blobs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), b"png").unwrap();
        let guid = Uuid::new_v4();
        let json = format!(
            r#"{{
                "kind": "UpdateObject",
                "object_type": "cms.taggroup",
                "tables": {{ "cms.taggroup": [ {{ "TagGroupID": 7, "TagGroupGUID": "{guid}" }} ],
                             "cms.tag": [] }},
                "parameters": {{ "SiteName": "corporate" }},
                "translations": [ {{ "object_type": "cms.site", "source_id": 70, "code_name": "corporate" }} ],
                "blobs": [ {{ "guid": "{guid}", "extension": ".PNG", "path": "logo.png" }} ]
            }}"#
        );

        let task = build_task(describe(&json), dir.path()).unwrap();
        let decoded = decode_task(
            task.kind,
            &task.object_type,
            &task.payload,
            task.binary_payload.as_deref(),
        )
        .unwrap();

        let group = &decoded.change_set.rows("cms.taggroup")[0];
        assert_eq!(group.id("TagGroupID"), Some(7));
        assert_eq!(group.guid("TagGroupGUID"), Some(guid));
        assert!(decoded.change_set.has_table("cms.tag"));
        assert_eq!(
            decoded.change_set.parameter("SiteName").as_text(),
            Some("corporate")
        );
        assert_eq!(decoded.change_set.translations.len(), 1);
        assert_eq!(
            decoded.blobs.get(&BlobKey::new(guid, "png")),
            Some(&b"png"[..])
        );
    }

    #[test]
    fn canonical_kind_names_are_accepted() {
        let json = r#"{
            "kind": "BreakACLInheritance",
            "object_type": "cms.article",
            "tables": { "cms.document": [ { "NodeGUID": "8a7f2c4e-1b9d-4a53-9c1e-0d6b5f3a2e71" } ] }
        }"#;
        let task = build_task(describe(json), Path::new(".")).unwrap();
        assert_eq!(task.kind, TaskKind::BreakAclInheritance);
        assert!(task.binary_payload.is_none());
    }

    #[test]
    fn missing_required_table_is_rejected() {
        let json = r#"{ "kind": "CreateDocument", "object_type": "cms.article" }"#;
        assert!(build_task(describe(json), Path::new(".")).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{ "kind": "UpdateObject", "object_type": "cms.tag", "rows": [] }"#;
        assert!(serde_json::from_str::<TaskDescription>(json).is_err());
    }

    #[test]
    fn run_writes_a_readable_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("task.json");
        let output = dir.path().join("task.cbor");
        std::fs::write(
            &input,
            r#"{ "kind": "DeleteObject", "object_type": "cms.tag",
                 "tables": { "cms.tag": [ { "TagID": 4, "TagName": "red" } ] } }"#,
        )
        .unwrap();

        run(&input, &output).unwrap();
        let file = TaskFile::read(&output).unwrap();
        assert_eq!(file.kind, TaskKind::DeleteObject);
        assert_eq!(file.object_type, "cms.tag");
    }
}
