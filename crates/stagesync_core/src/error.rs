//! Error types for the staging engine.

use thiserror::Error;

/// Result type for staging operations.
pub type StagingResult<T> = Result<T, StagingError>;

/// Errors that can occur while processing a staging task.
///
/// Every variant aborts the task. Objects persisted before the failure stay
/// persisted.
#[derive(Error, Debug)]
pub enum StagingError {
    /// A table or column required by the task is missing.
    #[error("structural error: {message}")]
    Structural {
        /// What is missing.
        message: String,
    },

    /// Foreign references could not be resolved, even after the post-process retry.
    #[error("cannot translate {object_type}: unresolved columns {}", .columns.join(", "))]
    Translation {
        /// Object type being applied.
        object_type: String,
        /// Columns whose reference did not resolve.
        columns: Vec<String>,
    },

    /// A restored object collides with an unrelated object on the target.
    #[error("{object_type} '{code_name}' collides with existing object {existing_id}")]
    Uniqueness {
        /// Object type being applied.
        object_type: String,
        /// Code name of the incoming object.
        code_name: String,
        /// Identifier of the conflicting target object.
        existing_id: i64,
    },

    /// The task kind is unknown or not allowed for this object.
    #[error("not supported: {message}")]
    NotSupported {
        /// What was refused.
        message: String,
    },

    /// A document operation references a location that does not exist on the target.
    #[error("dependency not found: {message}")]
    DependencyNotFound {
        /// What is missing and what to synchronize first.
        message: String,
    },

    /// More than one target object matched an identity lookup.
    #[error("ambiguous match for {object_type}: {count} target objects share its identity")]
    AmbiguousMatch {
        /// Object type being applied.
        object_type: String,
        /// Number of matches.
        count: usize,
    },

    /// A host collaborator failed.
    #[error("host error: {message}")]
    Host {
        /// Error reported by the collaborator.
        message: String,
    },

    /// Payload decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] stagesync_codec::CodecError),

    /// Binary store failure.
    #[error("storage error: {0}")]
    Storage(#[from] stagesync_storage::StorageError),
}

impl StagingError {
    /// Creates a structural error.
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    /// Creates a translation error.
    pub fn translation(object_type: impl Into<String>, columns: Vec<String>) -> Self {
        Self::Translation {
            object_type: object_type.into(),
            columns,
        }
    }

    /// Creates a not supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Creates a dependency not found error.
    pub fn dependency_not_found(message: impl Into<String>) -> Self {
        Self::DependencyNotFound {
            message: message.into(),
        }
    }

    /// Creates a host error.
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }

    /// Returns true if leaving the task for a manual retry can succeed
    /// without changing the task itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StagingError::DependencyNotFound { .. }
                | StagingError::Host { .. }
                | StagingError::Storage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(StagingError::dependency_not_found("parent /A").is_retryable());
        assert!(StagingError::host("deadlock").is_retryable());
        assert!(!StagingError::structural("missing table").is_retryable());
        assert!(!StagingError::translation("cms.tag", vec!["TagGroupID".into()]).is_retryable());
        assert!(!StagingError::not_supported("delete site").is_retryable());
    }

    #[test]
    fn translation_error_names_columns() {
        let err = StagingError::translation(
            "cms.tag",
            vec!["TagGroupID".into(), "TagOwnerID".into()],
        );
        let text = err.to_string();
        assert!(text.contains("cms.tag"));
        assert!(text.contains("TagGroupID, TagOwnerID"));
    }

    #[test]
    fn uniqueness_display() {
        let err = StagingError::Uniqueness {
            object_type: "cms.taggroup".into(),
            code_name: "News".into(),
            existing_id: 7,
        };
        assert_eq!(
            err.to_string(),
            "cms.taggroup 'News' collides with existing object 7"
        );
    }
}
