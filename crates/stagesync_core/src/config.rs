//! Staging engine configuration.

use serde::Deserialize;

/// Node-level columns copied onto the live node while publishing, although
/// version history does not track them.
pub const DEFAULT_NON_VERSIONED_COLUMNS: &[&str] = &[
    "NodeAlias",
    "NodeName",
    "NodeOrder",
    "NodeOwner",
    "DocumentName",
    "DocumentPublishFrom",
    "DocumentPublishTo",
];

/// Configuration for a [`StagingService`](crate::StagingService).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Code name of the site stamped on site-scoped objects and documents.
    pub target_site: Option<String>,

    /// Whether to append forward-replication records after each change.
    pub log_synchronization: bool,

    /// Code name of the user substituted for unresolved user references.
    pub fallback_user: String,

    /// Whether deferred objects get their one-shot retry.
    pub process_post_queue: bool,

    /// Columns copied onto the live node during publish.
    pub non_versioned_columns: Vec<String>,

    /// Whether the target requires manual check-in/out.
    pub check_in_out: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            target_site: None,
            log_synchronization: true,
            fallback_user: "administrator".to_string(),
            process_post_queue: true,
            non_versioned_columns: DEFAULT_NON_VERSIONED_COLUMNS
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
            check_in_out: false,
        }
    }
}

impl StagingConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target site code name.
    #[must_use]
    pub fn target_site(mut self, site: impl Into<String>) -> Self {
        self.target_site = Some(site.into());
        self
    }

    /// Sets whether forward-replication records are written.
    #[must_use]
    pub const fn log_synchronization(mut self, value: bool) -> Self {
        self.log_synchronization = value;
        self
    }

    /// Sets the fallback user code name.
    #[must_use]
    pub fn fallback_user(mut self, user: impl Into<String>) -> Self {
        self.fallback_user = user.into();
        self
    }

    /// Sets whether the post-process retry runs.
    #[must_use]
    pub const fn process_post_queue(mut self, value: bool) -> Self {
        self.process_post_queue = value;
        self
    }

    /// Replaces the non-versioned column list.
    #[must_use]
    pub fn non_versioned_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_versioned_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether manual check-in/out is required.
    #[must_use]
    pub const fn check_in_out(mut self, value: bool) -> Self {
        self.check_in_out = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StagingConfig::default();
        assert!(config.target_site.is_none());
        assert!(config.log_synchronization);
        assert!(config.process_post_queue);
        assert!(!config.check_in_out);
        assert_eq!(config.fallback_user, "administrator");
        assert!(config.non_versioned_columns.iter().any(|c| c == "NodeOrder"));
    }

    #[test]
    fn builder_pattern() {
        let config = StagingConfig::new()
            .target_site("corporate")
            .log_synchronization(false)
            .non_versioned_columns(["NodeOrder"]);

        assert_eq!(config.target_site.as_deref(), Some("corporate"));
        assert!(!config.log_synchronization);
        assert_eq!(config.non_versioned_columns, vec!["NodeOrder".to_string()]);
    }

    #[test]
    fn deserializes_partial_json() {
        let config: StagingConfig =
            serde_json::from_str(r#"{"target_site":"intranet","check_in_out":true}"#).unwrap();
        assert_eq!(config.target_site.as_deref(), Some("intranet"));
        assert!(config.check_in_out);
        assert_eq!(config.fallback_user, "administrator");
    }
}
