//! Sync run records kept in the run ledger.

use super::{
    CommitRange, ExecutionLog, ParseRunStatusError, ParseTriggerSourceError, SyncDomainError,
    SyncFailure, SyncFailureKind, SyncRunId, SyncTaskKey,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error text recorded on runs closed by the orphan reconciliation sweep.
pub const ORPHANED_RUN_MESSAGE: &str = "orphaned: run never reported completion";

/// Lifecycle status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run has started and not yet completed.
    Running,
    /// The target was fast-forwarded, created, or already up to date.
    Success,
    /// The run failed for any reason other than divergence.
    Failed,
    /// Source and target histories diverged.
    Conflict,
}

impl RunStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
        }
    }

    /// Returns `true` for every status other than [`Self::Running`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Maps a failure kind to the terminal status recorded for it.
    #[must_use]
    pub const fn for_failure(kind: SyncFailureKind) -> Self {
        match kind {
            SyncFailureKind::Conflict => Self::Conflict,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RunStatus {
    type Error = ParseRunStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "conflict" => Ok(Self::Conflict),
            _ => Err(ParseRunStatusError(value.to_owned())),
        }
    }
}

/// What started a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// An operator asked for the run.
    Manual,
    /// The scheduler fired the task's cron trigger.
    Cron,
    /// An external webhook presented the task's token.
    Webhook,
}

impl TriggerSource {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Cron => "cron",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TriggerSource {
    type Error = ParseTriggerSourceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "cron" => Ok(Self::Cron),
            "webhook" => Ok(Self::Webhook),
            _ => Err(ParseTriggerSourceError(value.to_owned())),
        }
    }
}

/// Result of one engine invocation, as recorded on the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The engine finished without error.
    Completed(CommitRange),
    /// The engine stopped with a tagged failure.
    Failed(SyncFailure),
}

/// One execution record of a sync task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    id: SyncRunId,
    task_key: SyncTaskKey,
    trigger: TriggerSource,
    status: RunStatus,
    commit_range: String,
    failure_kind: Option<SyncFailureKind>,
    error: Option<String>,
    log: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSyncRunData {
    /// Persisted run identifier.
    pub id: SyncRunId,
    /// Persisted task key.
    pub task_key: SyncTaskKey,
    /// Persisted trigger source.
    pub trigger: TriggerSource,
    /// Persisted status.
    pub status: RunStatus,
    /// Persisted commit range text.
    pub commit_range: String,
    /// Persisted failure kind.
    pub failure_kind: Option<SyncFailureKind>,
    /// Persisted error text.
    pub error: Option<String>,
    /// Persisted execution log.
    pub log: String,
    /// Persisted start timestamp.
    pub started_at: DateTime<Utc>,
    /// Persisted completion timestamp.
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    /// Starts a new run in the [`RunStatus::Running`] state.
    #[must_use]
    pub fn start(task_key: SyncTaskKey, trigger: TriggerSource, clock: &impl Clock) -> Self {
        Self {
            id: SyncRunId::new(),
            task_key,
            trigger,
            status: RunStatus::Running,
            commit_range: String::new(),
            failure_kind: None,
            error: None,
            log: String::new(),
            started_at: clock.utc(),
            finished_at: None,
        }
    }

    /// Reconstructs a run from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedSyncRunData) -> Self {
        Self {
            id: data.id,
            task_key: data.task_key,
            trigger: data.trigger,
            status: data.status,
            commit_range: data.commit_range,
            failure_kind: data.failure_kind,
            error: data.error,
            log: data.log,
            started_at: data.started_at,
            finished_at: data.finished_at,
        }
    }

    /// Returns the run identifier.
    #[must_use]
    pub const fn id(&self) -> SyncRunId {
        self.id
    }

    /// Returns the key of the task this run executed.
    #[must_use]
    pub const fn task_key(&self) -> &SyncTaskKey {
        &self.task_key
    }

    /// Returns what started the run.
    #[must_use]
    pub const fn trigger(&self) -> TriggerSource {
        self.trigger
    }

    /// Returns the run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the reported commit range (empty when already up to date or
    /// when the run did not succeed).
    #[must_use]
    pub fn commit_range(&self) -> &str {
        &self.commit_range
    }

    /// Returns the failure kind of an unsuccessful run.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<SyncFailureKind> {
        self.failure_kind
    }

    /// Returns the error text of an unsuccessful run.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the captured execution log.
    #[must_use]
    pub fn log(&self) -> &str {
        &self.log
    }

    /// Returns the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the completion timestamp, if completed.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Records the single terminal outcome of the run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::RunAlreadyCompleted`] when the run already
    /// carries a terminal status; the record is left unchanged.
    pub fn complete(
        &mut self,
        outcome: RunOutcome,
        log: &ExecutionLog,
        clock: &impl Clock,
    ) -> Result<(), SyncDomainError> {
        self.ensure_running()?;
        match outcome {
            RunOutcome::Completed(range) => {
                self.status = RunStatus::Success;
                self.commit_range = range.to_string();
            }
            RunOutcome::Failed(failure) => {
                self.status = RunStatus::for_failure(failure.kind());
                self.failure_kind = Some(failure.kind());
                self.error = Some(failure.message().to_owned());
            }
        }
        self.log = log.render();
        self.finished_at = Some(clock.utc());
        Ok(())
    }

    /// Closes a run whose executor never reported back.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::RunAlreadyCompleted`] for completed runs.
    pub fn mark_orphaned(&mut self, clock: &impl Clock) -> Result<(), SyncDomainError> {
        self.ensure_running()?;
        self.status = RunStatus::Failed;
        self.failure_kind = Some(SyncFailureKind::Orphaned);
        self.error = Some(ORPHANED_RUN_MESSAGE.to_owned());
        self.finished_at = Some(clock.utc());
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), SyncDomainError> {
        if self.status.is_terminal() {
            return Err(SyncDomainError::RunAlreadyCompleted(self.id.to_string()));
        }
        Ok(())
    }
}
