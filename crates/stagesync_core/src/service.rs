//! Task submission entry point.

use crate::config::StagingConfig;
use crate::decoder::decode_task;
use crate::engine::{Engine, TaskOrigin};
use crate::error::StagingResult;
use crate::host::Host;
use crate::observer::{AppliedObject, NoopObserver, TaskObserver, TaskOutcome};
use crate::sync::{IdentityOverride, MergeOverride};
use crate::types::{ChangeTask, ProcessOptions, TaskKind};
use std::sync::Arc;
use tracing::{error, info, info_span};

/// Applies staging tasks to a target environment.
///
/// A service is cheap to share between threads: every call builds its own
/// engine context, so tasks never see each other's translations.
/// Tasks touching the same objects concurrently rely on the host's own
/// row locking.
#[derive(Clone)]
pub struct StagingService {
    host: Host,
    config: StagingConfig,
    merge_override: Arc<dyn MergeOverride>,
}

impl StagingService {
    /// Creates a service over a host and a configuration.
    pub fn new(host: Host, config: StagingConfig) -> Self {
        Self {
            host,
            config,
            merge_override: Arc::new(IdentityOverride),
        }
    }

    /// Replaces the merge policy override consulted during child and
    /// binding reconciliation.
    #[must_use]
    pub fn with_merge_override(mut self, merge_override: Arc<dyn MergeOverride>) -> Self {
        self.merge_override = merge_override;
        self
    }

    /// The host collaborators.
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// The configuration.
    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    /// Processes one task with default options.
    ///
    /// # Errors
    ///
    /// Returns the first error the task hits. Objects persisted before the
    /// failure stay persisted; the error is also written to the host's
    /// event log.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use stagesync_core::{ChangeTask, StagingService, TaskKind};
    ///
    /// let task = ChangeTask::new(TaskKind::UpdateObject, "cms.tag", payload);
    /// let outcome = service.process_task(&task)?;
    /// println!("{} objects applied", outcome.applied);
    /// ```
    pub fn process_task(&self, task: &ChangeTask) -> StagingResult<TaskOutcome> {
        self.process_task_with(task, ProcessOptions::default(), &NoopObserver)
    }

    /// Processes one task with explicit options and an observer.
    ///
    /// # Errors
    ///
    /// See [`process_task`](Self::process_task).
    pub fn process_task_with(
        &self,
        task: &ChangeTask,
        options: ProcessOptions,
        observer: &dyn TaskObserver,
    ) -> StagingResult<TaskOutcome> {
        let span = info_span!(
            "staging_task",
            kind = %task.kind,
            object_type = %task.object_type
        );
        let _guard = span.enter();

        let result = self.run(task, options, observer);
        match &result {
            Ok(outcome) => info!(
                applied = outcome.applied,
                deleted = outcome.deleted,
                deferred_resolved = outcome.deferred_resolved,
                "task processed"
            ),
            Err(err) => {
                error!(error = %err, retryable = err.is_retryable(), "task failed");
                self.host
                    .events
                    .log_error("Staging", task.kind.as_str(), &format!("{}: {err}", task.object_type));
            }
        }
        result
    }

    /// Processes a raw task payload and returns the root object it leaves
    /// on the target, if any.
    ///
    /// # Errors
    ///
    /// See [`process_task`](Self::process_task).
    pub fn process(
        &self,
        kind: TaskKind,
        object_type: &str,
        payload: &[u8],
        binary_payload: Option<&[u8]>,
        process_children: bool,
        observer: &dyn TaskObserver,
    ) -> StagingResult<Option<AppliedObject>> {
        let mut task = ChangeTask::new(kind, object_type, payload.to_vec());
        task.binary_payload = binary_payload.map(<[u8]>::to_vec);
        let options = ProcessOptions::default().process_children(process_children);
        self.process_task_with(&task, options, observer)
            .map(|outcome| outcome.object)
    }

    /// Like [`process`](Self::process), walking children and without an
    /// observer.
    ///
    /// # Errors
    ///
    /// See [`process_task`](Self::process_task).
    pub fn process_payload(
        &self,
        kind: TaskKind,
        object_type: &str,
        payload: &[u8],
        binary_payload: Option<&[u8]>,
    ) -> StagingResult<Option<AppliedObject>> {
        self.process(kind, object_type, payload, binary_payload, true, &NoopObserver)
    }

    fn run(
        &self,
        task: &ChangeTask,
        options: ProcessOptions,
        observer: &dyn TaskObserver,
    ) -> StagingResult<TaskOutcome> {
        let decoded = decode_task(
            task.kind,
            &task.object_type,
            &task.payload,
            task.binary_payload.as_deref(),
        )?;
        let origin = TaskOrigin {
            source_user: task.source_user.as_ref(),
            task_groups: &task.task_groups,
        };
        let engine = Engine::new(
            &self.host,
            &self.config,
            &decoded,
            origin,
            options,
            observer,
            self.merge_override.as_ref(),
        )?;
        engine.run()
    }
}

impl std::fmt::Debug for StagingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingService")
            .field("host", &self.host)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
