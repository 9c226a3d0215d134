//! Catalog port for sync tasks and the repository records they reference.

use crate::sync::domain::{RepositoryKey, RepositoryRecord, SyncTask, SyncTaskKey, WebhookToken};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for catalog operations.
pub type SyncCatalogResult<T> = Result<T, SyncCatalogError>;

/// Persistence contract for sync tasks and repository records.
#[async_trait]
pub trait SyncCatalog: Send + Sync {
    /// Stores a new repository record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncCatalogError::DuplicateRepository`] when the key exists.
    async fn store_repository(&self, repository: &RepositoryRecord) -> SyncCatalogResult<()>;

    /// Persists changes to an existing repository record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncCatalogError::RepositoryNotFound`] when the key is unknown.
    async fn update_repository(&self, repository: &RepositoryRecord) -> SyncCatalogResult<()>;

    /// Finds a repository record by key.
    async fn find_repository(
        &self,
        key: &RepositoryKey,
    ) -> SyncCatalogResult<Option<RepositoryRecord>>;

    /// Returns all repository records ordered by key.
    async fn list_repositories(&self) -> SyncCatalogResult<Vec<RepositoryRecord>>;

    /// Stores a new sync task.
    ///
    /// # Errors
    ///
    /// Returns [`SyncCatalogError::DuplicateTask`] when the key exists or
    /// [`SyncCatalogError::DuplicateWebhookToken`] when another task already
    /// uses the webhook token.
    async fn store_task(&self, task: &SyncTask) -> SyncCatalogResult<()>;

    /// Persists changes to an existing sync task.
    ///
    /// # Errors
    ///
    /// Returns [`SyncCatalogError::TaskNotFound`] when the key is unknown.
    async fn update_task(&self, task: &SyncTask) -> SyncCatalogResult<()>;

    /// Deletes a sync task. Returns `false` when no task had the key.
    async fn delete_task(&self, key: &SyncTaskKey) -> SyncCatalogResult<bool>;

    /// Finds a sync task by key.
    async fn find_task(&self, key: &SyncTaskKey) -> SyncCatalogResult<Option<SyncTask>>;

    /// Finds the sync task that owns a webhook token.
    async fn find_task_by_webhook_token(
        &self,
        token: &str,
    ) -> SyncCatalogResult<Option<SyncTask>>;

    /// Returns all sync tasks ordered by key.
    async fn list_tasks(&self) -> SyncCatalogResult<Vec<SyncTask>>;
}

/// Errors returned by catalog implementations.
#[derive(Debug, Clone, Error)]
pub enum SyncCatalogError {
    /// A repository with the same key already exists.
    #[error("duplicate repository key: {0}")]
    DuplicateRepository(RepositoryKey),

    /// The repository was not found.
    #[error("repository not found: {0}")]
    RepositoryNotFound(RepositoryKey),

    /// A task with the same key already exists.
    #[error("duplicate sync task key: {0}")]
    DuplicateTask(SyncTaskKey),

    /// Another task already uses the webhook token.
    #[error("webhook token already assigned to another task")]
    DuplicateWebhookToken,

    /// The task was not found.
    #[error("sync task not found: {0}")]
    TaskNotFound(SyncTaskKey),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted catalog data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl SyncCatalogError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

/// Returns `true` when `token` equals the task's webhook token.
///
/// Compares every byte regardless of where the first mismatch occurs.
#[must_use]
pub fn webhook_token_matches(expected: &WebhookToken, token: &str) -> bool {
    let expected_bytes = expected.as_str().as_bytes();
    let candidate = token.as_bytes();
    if expected_bytes.len() != candidate.len() {
        return false;
    }
    expected_bytes
        .iter()
        .zip(candidate)
        .fold(0_u8, |acc, (left, right)| acc | (left ^ right))
        == 0
}
