//! Domain model for branch synchronisation.
//!
//! Sync tasks, repository records, run records and the value objects they
//! are built from. Infrastructure concerns (git, persistence, credentials)
//! stay outside this boundary.

mod credentials;
mod error;
mod failure;
mod ids;
mod log;
mod merge;
mod refs;
mod repository;
mod run;
mod task;

pub use credentials::{CredentialSpec, RemoteCredentials, Secret};
pub use error::{
    ParseFailureKindError, ParseRunStatusError, ParseTriggerSourceError, SyncDomainError,
};
pub use failure::{SyncFailure, SyncFailureKind};
pub use ids::{RepositoryKey, SyncRunId, SyncTaskKey};
pub use log::{ExecutionLog, redact_credentials, redact_url};
pub use merge::MergeCheckReport;
pub use refs::{BranchName, CommitHash, CommitRange, RemoteName};
pub use repository::{PersistedRepositoryData, RepositoryRecord};
pub use run::{
    ORPHANED_RUN_MESSAGE, PersistedSyncRunData, RunOutcome, RunStatus, SyncRun, TriggerSource,
};
pub use task::{
    CronExpression, PersistedSyncTaskData, PushOptions, SyncEndpoint, SyncTask, SyncTaskSettings,
    WebhookToken,
};
