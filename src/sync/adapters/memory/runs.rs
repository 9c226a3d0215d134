//! In-memory run ledger.

use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::sync::{
    domain::{RunStatus, SyncRun, SyncRunId, SyncTaskKey},
    ports::{SyncRunRepository, SyncRunRepositoryError, SyncRunRepositoryResult},
};

/// Thread-safe in-memory run repository.
#[derive(Debug, Clone, Default)]
pub struct InMemorySyncRunRepository {
    state: Arc<RwLock<InMemoryRunState>>,
}

#[derive(Debug, Default)]
struct InMemoryRunState {
    runs: HashMap<SyncRunId, SyncRun>,
    // Insertion order breaks ties between runs started in the same instant.
    order: Vec<SyncRunId>,
}

impl InMemorySyncRunRepository {
    /// Creates an empty run repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl std::fmt::Display) -> SyncRunRepositoryError {
    SyncRunRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl SyncRunRepository for InMemorySyncRunRepository {
    async fn create(&self, run: &SyncRun) -> SyncRunRepositoryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if state.runs.contains_key(&run.id()) {
            return Err(SyncRunRepositoryError::DuplicateRun(run.id()));
        }
        state.order.push(run.id());
        state.runs.insert(run.id(), run.clone());
        Ok(())
    }

    async fn update(&self, run: &SyncRun) -> SyncRunRepositoryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let slot = state
            .runs
            .get_mut(&run.id())
            .ok_or(SyncRunRepositoryError::NotFound(run.id()))?;
        *slot = run.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: SyncRunId) -> SyncRunRepositoryResult<Option<SyncRun>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.runs.get(&id).cloned())
    }

    async fn list_for_task(
        &self,
        task_key: &SyncTaskKey,
        limit: usize,
    ) -> SyncRunRepositoryResult<Vec<SyncRun>> {
        let state = self.state.read().map_err(lock_error)?;
        let mut runs: Vec<(usize, SyncRun)> = state
            .order
            .iter()
            .enumerate()
            .filter_map(|(position, id)| state.runs.get(id).map(|run| (position, run)))
            .filter(|(_, run)| run.task_key() == task_key)
            .map(|(position, run)| (position, run.clone()))
            .collect();
        runs.sort_by_key(|(position, run)| Reverse((run.started_at(), *position)));
        Ok(runs.into_iter().take(limit).map(|(_, run)| run).collect())
    }

    async fn list_running(&self) -> SyncRunRepositoryResult<Vec<SyncRun>> {
        let state = self.state.read().map_err(lock_error)?;
        let mut runs: Vec<SyncRun> = state
            .order
            .iter()
            .filter_map(|id| state.runs.get(id))
            .filter(|run| run.status() == RunStatus::Running)
            .cloned()
            .collect();
        runs.sort_by_key(SyncRun::started_at);
        Ok(runs)
    }
}
