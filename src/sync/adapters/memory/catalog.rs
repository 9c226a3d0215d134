//! In-memory catalog of sync tasks and repository records.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::sync::{
    domain::{RepositoryKey, RepositoryRecord, SyncTask, SyncTaskKey},
    ports::{SyncCatalog, SyncCatalogError, SyncCatalogResult, webhook_token_matches},
};

/// Thread-safe in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemorySyncCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    repositories: BTreeMap<RepositoryKey, RepositoryRecord>,
    tasks: BTreeMap<SyncTaskKey, SyncTask>,
}

impl InMemorySyncCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl std::fmt::Display) -> SyncCatalogError {
    SyncCatalogError::persistence(std::io::Error::other(err.to_string()))
}

/// Rejects a webhook token already used by a task other than `task`.
fn ensure_unique_webhook_token(
    state: &InMemoryCatalogState,
    task: &SyncTask,
) -> SyncCatalogResult<()> {
    let Some(token) = task.webhook_token() else {
        return Ok(());
    };
    let clash = state.tasks.values().any(|other| {
        other.key() != task.key()
            && other
                .webhook_token()
                .is_some_and(|existing| webhook_token_matches(existing, token.as_str()))
    });
    if clash {
        return Err(SyncCatalogError::DuplicateWebhookToken);
    }
    Ok(())
}

#[async_trait]
impl SyncCatalog for InMemorySyncCatalog {
    async fn store_repository(&self, repository: &RepositoryRecord) -> SyncCatalogResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if state.repositories.contains_key(repository.key()) {
            return Err(SyncCatalogError::DuplicateRepository(
                repository.key().clone(),
            ));
        }
        state
            .repositories
            .insert(repository.key().clone(), repository.clone());
        Ok(())
    }

    async fn update_repository(&self, repository: &RepositoryRecord) -> SyncCatalogResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let slot = state
            .repositories
            .get_mut(repository.key())
            .ok_or_else(|| SyncCatalogError::RepositoryNotFound(repository.key().clone()))?;
        *slot = repository.clone();
        Ok(())
    }

    async fn find_repository(
        &self,
        key: &RepositoryKey,
    ) -> SyncCatalogResult<Option<RepositoryRecord>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.repositories.get(key).cloned())
    }

    async fn list_repositories(&self) -> SyncCatalogResult<Vec<RepositoryRecord>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.repositories.values().cloned().collect())
    }

    async fn store_task(&self, task: &SyncTask) -> SyncCatalogResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if state.tasks.contains_key(task.key()) {
            return Err(SyncCatalogError::DuplicateTask(task.key().clone()));
        }
        ensure_unique_webhook_token(&state, task)?;
        state.tasks.insert(task.key().clone(), task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &SyncTask) -> SyncCatalogResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if !state.tasks.contains_key(task.key()) {
            return Err(SyncCatalogError::TaskNotFound(task.key().clone()));
        }
        ensure_unique_webhook_token(&state, task)?;
        state.tasks.insert(task.key().clone(), task.clone());
        Ok(())
    }

    async fn delete_task(&self, key: &SyncTaskKey) -> SyncCatalogResult<bool> {
        let mut state = self.state.write().map_err(lock_error)?;
        Ok(state.tasks.remove(key).is_some())
    }

    async fn find_task(&self, key: &SyncTaskKey) -> SyncCatalogResult<Option<SyncTask>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.tasks.get(key).cloned())
    }

    async fn find_task_by_webhook_token(
        &self,
        token: &str,
    ) -> SyncCatalogResult<Option<SyncTask>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state
            .tasks
            .values()
            .find(|task| {
                task.webhook_token()
                    .is_some_and(|expected| webhook_token_matches(expected, token))
            })
            .cloned())
    }

    async fn list_tasks(&self) -> SyncCatalogResult<Vec<SyncTask>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.tasks.values().cloned().collect())
    }
}
