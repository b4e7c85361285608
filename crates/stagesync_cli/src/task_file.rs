//! On-disk task envelope.
//!
//! A task file is one CBOR map holding the task header and the two
//! serialized payloads exactly as the transport delivers them.

use serde::{Deserialize, Serialize};
use stagesync_core::{ChangeTask, GroupRef, SourceUser, TaskKind};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Errors reading or writing task files.
#[derive(Error, Debug)]
pub enum TaskFileError {
    /// The file could not be opened or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a task envelope.
    #[error("{path} is not a task file: {message}")]
    Malformed {
        /// File involved.
        path: String,
        /// Decoder message.
        message: String,
    },

    /// The envelope could not be serialized.
    #[error("failed to encode task file: {0}")]
    Encode(String),
}

/// A serialized change task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFile {
    /// Kind of change.
    pub kind: TaskKind,
    /// Object type or document class.
    pub object_type: String,
    /// Author on the source.
    #[serde(default)]
    pub source_user: Option<SourceUser>,
    /// Task groups.
    #[serde(default)]
    pub task_groups: Vec<GroupRef>,
    /// CBOR change-set.
    pub payload: Vec<u8>,
    /// CBOR blob set.
    #[serde(default)]
    pub binary_payload: Option<Vec<u8>>,
}

impl TaskFile {
    /// Reads a task file.
    pub fn read(path: &Path) -> Result<Self, TaskFileError> {
        let file = File::open(path).map_err(|source| TaskFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        ciborium::from_reader(BufReader::new(file)).map_err(|e| TaskFileError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Writes the task file, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<(), TaskFileError> {
        let file = File::create(path).map_err(|source| TaskFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        ciborium::into_writer(self, BufWriter::new(file))
            .map_err(|e| TaskFileError::Encode(e.to_string()))
    }

    /// The task as handed to the staging service.
    pub fn to_task(&self) -> ChangeTask {
        ChangeTask {
            kind: self.kind,
            object_type: self.object_type.clone(),
            payload: self.payload.clone(),
            binary_payload: self.binary_payload.clone(),
            source_user: self.source_user.clone(),
            task_groups: self.task_groups.clone(),
        }
    }
}

impl From<ChangeTask> for TaskFile {
    fn from(task: ChangeTask) -> Self {
        Self {
            kind: task.kind,
            object_type: task.object_type,
            source_user: task.source_user,
            task_groups: task.task_groups,
            payload: task.payload,
            binary_payload: task.binary_payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagesync_codec::{ChangeSet, Row};
    use tempfile::tempdir;
    use uuid::Uuid;

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("task.cbor");
        let payload = ChangeSet::new()
            .with_row("cms.tag", Row::new().with("TagID", 4))
            .encode()
            .unwrap();
        let task = ChangeTask::new(TaskKind::UpdateObject, "cms.tag", payload)
            .with_source_user(SourceUser {
                guid: Uuid::new_v4(),
                name: "jane".into(),
            })
            .with_group(GroupRef {
                id: 3,
                name: "release".into(),
            });

        let file = TaskFile::from(task);
        file.write(&path).unwrap();
        let read = TaskFile::read(&path).unwrap();
        assert_eq!(read, file);
        assert_eq!(read.to_task().task_groups[0].name, "release");
    }

    #[test]
    fn garbage_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("task.cbor");
        std::fs::write(&path, b"not cbor at all").unwrap();
        assert!(matches!(
            TaskFile::read(&path),
            Err(TaskFileError::Malformed { .. })
        ));
        assert!(matches!(
            TaskFile::read(&dir.path().join("missing.cbor")),
            Err(TaskFileError::Io { .. })
        ));
    }
}
