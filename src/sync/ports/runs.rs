//! Run ledger persistence port.

use crate::sync::domain::{SyncRun, SyncRunId, SyncTaskKey};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for run repository operations.
pub type SyncRunRepositoryResult<T> = Result<T, SyncRunRepositoryError>;

/// Append/update contract for the run ledger.
#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Appends a new run record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncRunRepositoryError::DuplicateRun`] when the ID exists.
    async fn create(&self, run: &SyncRun) -> SyncRunRepositoryResult<()>;

    /// Overwrites an existing run record with its completed state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncRunRepositoryError::NotFound`] when the run is unknown.
    async fn update(&self, run: &SyncRun) -> SyncRunRepositoryResult<()>;

    /// Finds a run by identifier.
    async fn find_by_id(&self, id: SyncRunId) -> SyncRunRepositoryResult<Option<SyncRun>>;

    /// Returns up to `limit` runs of a task, newest first.
    async fn list_for_task(
        &self,
        task_key: &SyncTaskKey,
        limit: usize,
    ) -> SyncRunRepositoryResult<Vec<SyncRun>>;

    /// Returns every run still in the running state, oldest first.
    async fn list_running(&self) -> SyncRunRepositoryResult<Vec<SyncRun>>;
}

/// Errors returned by run repository implementations.
#[derive(Debug, Clone, Error)]
pub enum SyncRunRepositoryError {
    /// A run with the same identifier already exists.
    #[error("duplicate sync run identifier: {0}")]
    DuplicateRun(SyncRunId),

    /// The run was not found.
    #[error("sync run not found: {0}")]
    NotFound(SyncRunId),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted run data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl SyncRunRepositoryError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
