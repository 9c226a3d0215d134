//! Run ledger service: the only writer of run records.

use crate::sync::{
    domain::{
        ExecutionLog, RunOutcome, SyncDomainError, SyncRun, SyncRunId, SyncTaskKey, TriggerSource,
    },
    ports::{SyncRunRepository, SyncRunRepositoryError},
};
use chrono::TimeDelta;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors returned by [`RunLedger`].
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The run state transition is not allowed.
    #[error(transparent)]
    Domain(#[from] SyncDomainError),
    /// Persistence failed.
    #[error(transparent)]
    Repository(#[from] SyncRunRepositoryError),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Creates, completes and queries sync runs.
pub struct RunLedger<L, K>
where
    L: SyncRunRepository,
    K: Clock + Send + Sync,
{
    runs: Arc<L>,
    clock: Arc<K>,
}

impl<L, K> RunLedger<L, K>
where
    L: SyncRunRepository,
    K: Clock + Send + Sync,
{
    /// Creates a ledger over a run repository.
    #[must_use]
    pub const fn new(runs: Arc<L>, clock: Arc<K>) -> Self {
        Self { runs, clock }
    }

    /// Records the start of a run.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Repository`] when the run cannot be stored.
    pub async fn begin(
        &self,
        task_key: &SyncTaskKey,
        trigger: TriggerSource,
    ) -> LedgerResult<SyncRun> {
        let run = SyncRun::start(task_key.clone(), trigger, &*self.clock);
        self.runs.create(&run).await?;
        Ok(run)
    }

    /// Records the terminal outcome of a run together with its log.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Domain`] when the run is already terminal and
    /// [`LedgerError::Repository`] when the update cannot be stored.
    pub async fn complete(
        &self,
        mut run: SyncRun,
        outcome: RunOutcome,
        log: &ExecutionLog,
    ) -> LedgerResult<SyncRun> {
        run.complete(outcome, log, &*self.clock)?;
        self.runs.update(&run).await?;
        Ok(run)
    }

    /// Returns one run by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Repository`] when the lookup fails.
    pub async fn find(&self, id: SyncRunId) -> LedgerResult<Option<SyncRun>> {
        Ok(self.runs.find_by_id(id).await?)
    }

    /// Returns up to `limit` runs of a task, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Repository`] when the lookup fails.
    pub async fn history(
        &self,
        task_key: &SyncTaskKey,
        limit: usize,
    ) -> LedgerResult<Vec<SyncRun>> {
        Ok(self.runs.list_for_task(task_key, limit).await?)
    }

    /// Closes runs that have been `running` for longer than `max_age`.
    ///
    /// Returns the runs that were closed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Repository`] when listing fails. Runs that
    /// cannot be updated are logged and skipped.
    pub async fn reconcile_orphaned(&self, max_age: Duration) -> LedgerResult<Vec<SyncRun>> {
        let age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let now = self.clock.utc();
        let cutoff = now.checked_sub_signed(age).unwrap_or(now);
        let mut closed = Vec::new();
        for mut run in self.runs.list_running().await? {
            if run.started_at() >= cutoff {
                continue;
            }
            if let Err(err) = run.mark_orphaned(&*self.clock) {
                warn!(run = %run.id(), error = %err, "skipping orphan candidate");
                continue;
            }
            match self.runs.update(&run).await {
                Ok(()) => closed.push(run),
                Err(err) => warn!(run = %run.id(), error = %err, "could not close orphaned run"),
            }
        }
        Ok(closed)
    }
}
