//! Port contracts for branch synchronisation.
//!
//! Ports define infrastructure-agnostic interfaces used by sync services.

mod catalog;
mod credentials;
mod git;
mod notifier;
mod runs;
mod schedule;

pub use catalog::{SyncCatalog, SyncCatalogError, SyncCatalogResult, webhook_token_matches};
pub use credentials::{CredentialError, CredentialResolver, TransportCredential};
pub use git::{
    ChangeKind, ChangedPath, FetchOutcome, FetchRequest, GitError, GitGateway, GitResult,
    MergeCommand, PushOutcome, PushRequest,
};
#[cfg(test)]
pub use git::MockGitGateway;
#[cfg(test)]
pub use notifier::MockRunNotifier;
pub use notifier::{NotifyError, RunCompletedEvent, RunNotifier};
pub use runs::{SyncRunRepository, SyncRunRepositoryError, SyncRunRepositoryResult};
pub use schedule::{NoopScheduleHook, ScheduleHook};
