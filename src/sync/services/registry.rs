//! Registration of repositories and sync tasks.

use crate::sync::{
    domain::{
        RemoteCredentials, RepositoryKey, RepositoryRecord, SyncDomainError, SyncTask,
        SyncTaskKey, SyncTaskSettings,
    },
    ports::{ScheduleHook, SyncCatalog, SyncCatalogError},
};
use mockable::Clock;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Repository to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRegistration {
    /// Repository key.
    pub key: RepositoryKey,
    /// Working repository path.
    pub path: PathBuf,
    /// Fallback remote URL.
    pub registered_url: Option<String>,
    /// Credential set.
    pub credentials: RemoteCredentials,
}

/// Service-level errors for registration operations.
#[derive(Debug, Clone, Error)]
pub enum SyncTaskServiceError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] SyncDomainError),
    /// Catalog operation failed.
    #[error(transparent)]
    Catalog(#[from] SyncCatalogError),
    /// A task endpoint references an unregistered repository.
    #[error("repository {0} is not registered")]
    UnknownRepository(RepositoryKey),
}

/// Result type for registration operations.
pub type SyncTaskServiceResult<T> = Result<T, SyncTaskServiceError>;

/// Creates, updates and removes sync tasks and repository records.
///
/// Every successful task write is forwarded to the [`ScheduleHook`] before
/// the call returns.
pub struct SyncTaskService<C, H, K>
where
    C: SyncCatalog,
    H: ScheduleHook,
    K: Clock + Send + Sync,
{
    catalog: Arc<C>,
    hook: Arc<H>,
    clock: Arc<K>,
}

impl<C, H, K> SyncTaskService<C, H, K>
where
    C: SyncCatalog,
    H: ScheduleHook,
    K: Clock + Send + Sync,
{
    /// Creates a registration service.
    #[must_use]
    pub const fn new(catalog: Arc<C>, hook: Arc<H>, clock: Arc<K>) -> Self {
        Self {
            catalog,
            hook,
            clock,
        }
    }

    /// Registers a repository.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTaskServiceError::Domain`] for invalid paths or
    /// credentials and [`SyncTaskServiceError::Catalog`] when the key is
    /// taken or storage fails.
    pub async fn register_repository(
        &self,
        registration: RepositoryRegistration,
    ) -> SyncTaskServiceResult<RepositoryRecord> {
        let record = RepositoryRecord::new(
            registration.key,
            registration.path,
            registration.registered_url,
            registration.credentials,
            &*self.clock,
        )?;
        self.catalog.store_repository(&record).await?;
        info!(repository = %record.key(), "repository registered");
        Ok(record)
    }

    /// Replaces the registered URL and credentials of a repository.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTaskServiceError::UnknownRepository`] for unknown keys,
    /// [`SyncTaskServiceError::Domain`] for invalid credentials and
    /// [`SyncTaskServiceError::Catalog`] when storage fails.
    pub async fn update_repository(
        &self,
        key: &RepositoryKey,
        registered_url: Option<String>,
        credentials: RemoteCredentials,
    ) -> SyncTaskServiceResult<RepositoryRecord> {
        let mut record = self.require_repository(key).await?;
        record.set_credentials(credentials, &*self.clock)?;
        record.set_registered_url(registered_url, &*self.clock);
        self.catalog.update_repository(&record).await?;
        Ok(record)
    }

    /// Registers a repository, or refreshes its URL and credentials when the
    /// key is already registered.
    ///
    /// A stored path is never changed; a differing path is logged and kept.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::register_repository`] and
    /// [`Self::update_repository`].
    pub async fn upsert_repository(
        &self,
        registration: RepositoryRegistration,
    ) -> SyncTaskServiceResult<RepositoryRecord> {
        let Some(existing) = self.catalog.find_repository(&registration.key).await? else {
            return self.register_repository(registration).await;
        };
        if existing.path() != registration.path.as_path() {
            warn!(
                repository = %registration.key,
                stored = %existing.path().display(),
                requested = %registration.path.display(),
                "repository path differs from the stored one; keeping the stored path"
            );
        }
        self.update_repository(
            &registration.key,
            registration.registered_url,
            registration.credentials,
        )
        .await
    }

    /// Returns a repository record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTaskServiceError::Catalog`] when the lookup fails.
    pub async fn find_repository(
        &self,
        key: &RepositoryKey,
    ) -> SyncTaskServiceResult<Option<RepositoryRecord>> {
        Ok(self.catalog.find_repository(key).await?)
    }

    /// Lists repository records.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTaskServiceError::Catalog`] when the lookup fails.
    pub async fn list_repositories(&self) -> SyncTaskServiceResult<Vec<RepositoryRecord>> {
        Ok(self.catalog.list_repositories().await?)
    }

    /// Creates a task and schedules it when it is schedulable.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTaskServiceError::UnknownRepository`] when an endpoint
    /// references an unregistered repository,
    /// [`SyncTaskServiceError::Domain`] for invalid settings and
    /// [`SyncTaskServiceError::Catalog`] for duplicates or storage failures.
    pub async fn create_task(
        &self,
        key: SyncTaskKey,
        settings: SyncTaskSettings,
    ) -> SyncTaskServiceResult<SyncTask> {
        self.ensure_repositories(&settings).await?;
        let task = SyncTask::new(key, settings, &*self.clock)?;
        self.catalog.store_task(&task).await?;
        self.hook.on_task_saved(&task);
        info!(task = %task.key(), schedulable = task.is_schedulable(), "sync task created");
        Ok(task)
    }

    /// Replaces the settings of an existing task and reschedules it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTaskServiceError::Catalog`] with
    /// [`SyncCatalogError::TaskNotFound`] for unknown keys, plus the errors
    /// of [`Self::create_task`].
    pub async fn update_task(
        &self,
        key: &SyncTaskKey,
        settings: SyncTaskSettings,
    ) -> SyncTaskServiceResult<SyncTask> {
        let mut task = self
            .catalog
            .find_task(key)
            .await?
            .ok_or_else(|| SyncCatalogError::TaskNotFound(key.clone()))?;
        self.ensure_repositories(&settings).await?;
        task.apply(settings, &*self.clock)?;
        self.catalog.update_task(&task).await?;
        self.hook.on_task_saved(&task);
        info!(task = %task.key(), schedulable = task.is_schedulable(), "sync task updated");
        Ok(task)
    }

    /// Creates the task, or replaces its settings when it already exists.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::create_task`] and [`Self::update_task`].
    pub async fn upsert_task(
        &self,
        key: SyncTaskKey,
        settings: SyncTaskSettings,
    ) -> SyncTaskServiceResult<SyncTask> {
        if self.catalog.find_task(&key).await?.is_some() {
            self.update_task(&key, settings).await
        } else {
            self.create_task(key, settings).await
        }
    }

    /// Deletes a task and removes its trigger.
    ///
    /// Returns `false` when no task existed under the key. Past runs stay in
    /// the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTaskServiceError::Catalog`] when storage fails.
    pub async fn delete_task(&self, key: &SyncTaskKey) -> SyncTaskServiceResult<bool> {
        let deleted = self.catalog.delete_task(key).await?;
        self.hook.on_task_deleted(key);
        if deleted {
            info!(task = %key, "sync task deleted");
        }
        Ok(deleted)
    }

    /// Returns a task.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTaskServiceError::Catalog`] when the lookup fails.
    pub async fn find_task(&self, key: &SyncTaskKey) -> SyncTaskServiceResult<Option<SyncTask>> {
        Ok(self.catalog.find_task(key).await?)
    }

    /// Lists every task.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTaskServiceError::Catalog`] when the lookup fails.
    pub async fn list_tasks(&self) -> SyncTaskServiceResult<Vec<SyncTask>> {
        Ok(self.catalog.list_tasks().await?)
    }

    async fn require_repository(
        &self,
        key: &RepositoryKey,
    ) -> SyncTaskServiceResult<RepositoryRecord> {
        self.catalog
            .find_repository(key)
            .await?
            .ok_or_else(|| SyncTaskServiceError::UnknownRepository(key.clone()))
    }

    async fn ensure_repositories(&self, settings: &SyncTaskSettings) -> SyncTaskServiceResult<()> {
        self.require_repository(settings.source.repository()).await?;
        self.require_repository(settings.target.repository()).await?;
        Ok(())
    }
}
