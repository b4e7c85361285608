//! Inspect command implementation.

use crate::task_file::TaskFile;
use serde::Serialize;
use stagesync_codec::{BlobSet, ChangeSet, Row};
use stagesync_core::{GroupRef, SourceUser};
use std::path::Path;

/// Task file inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Task file path.
    pub path: String,
    /// Task kind.
    pub kind: String,
    /// Object type or document class.
    pub object_type: String,
    /// Author on the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_user: Option<SourceUser>,
    /// Task groups.
    pub task_groups: Vec<GroupRef>,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Tables of the change-set.
    pub tables: Vec<TableSummary>,
    /// Number of translation seeds.
    pub seed_count: usize,
    /// Binary payloads.
    pub blobs: Vec<BlobSummary>,
}

/// One table of the change-set.
#[derive(Debug, Serialize)]
pub struct TableSummary {
    /// Table name.
    pub name: String,
    /// Number of rows.
    pub row_count: usize,
    /// Rows (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
}

/// One binary payload.
#[derive(Debug, Serialize)]
pub struct BlobSummary {
    /// `<guid>.<ext>`.
    pub name: String,
    /// Size in bytes.
    pub size: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_rows: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let file = TaskFile::read(path)?;
    let result = inspect(path, &file, show_rows)?;

    // Output
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Summarizes a task file without interpreting its tables.
pub fn inspect(
    path: &Path,
    file: &TaskFile,
    show_rows: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let change_set = ChangeSet::decode(&file.payload)?;
    let blobs = match &file.binary_payload {
        Some(bytes) if !bytes.is_empty() => BlobSet::decode(bytes)?,
        _ => BlobSet::new(),
    };

    let tables = change_set
        .tables
        .iter()
        .map(|(name, table)| TableSummary {
            name: name.clone(),
            row_count: table.len(),
            rows: show_rows.then(|| table.rows.clone()),
        })
        .collect();
    let blobs = blobs
        .iter()
        .map(|(key, data)| BlobSummary {
            name: key.file_name(),
            size: data.len(),
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        kind: file.kind.to_string(),
        object_type: file.object_type.clone(),
        source_user: file.source_user.clone(),
        task_groups: file.task_groups.clone(),
        payload_size: file.payload.len(),
        tables,
        seed_count: change_set.translations.len(),
        blobs,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Stagesync Task Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!("Kind: {}", result.kind);
    println!("Type: {}", result.object_type);
    if let Some(user) = &result.source_user {
        println!("User: {} ({})", user.name, user.guid);
    }
    for group in &result.task_groups {
        println!("Group: [{}] {}", group.id, group.name);
    }
    println!();
    println!("Payload: {} bytes, {} seeds", result.payload_size, result.seed_count);
    println!();
    println!("Tables:");
    for table in &result.tables {
        println!("  {} ({} rows)", table.name, table.row_count);
        for row in table.rows.iter().flatten() {
            let cells: Vec<String> = row.iter().map(|(c, v)| format!("{c}={v}")).collect();
            println!("    {}", cells.join(", "));
        }
    }

    if !result.blobs.is_empty() {
        println!();
        println!("Binaries:");
        for blob in &result.blobs {
            println!("  {} ({} bytes)", blob.name, blob.size);
        }
    }
}
