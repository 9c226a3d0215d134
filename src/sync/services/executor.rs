//! Single entry point that turns a trigger into exactly one run record.

use super::engine::{FastForwardEngine, SyncJobContext};
use super::ledger::{LedgerError, RunLedger};
use crate::sync::{
    domain::{
        ExecutionLog, RepositoryKey, RepositoryRecord, RunOutcome, RunStatus, SyncFailure,
        SyncFailureKind, SyncRun, SyncTask, SyncTaskKey, TriggerSource,
    },
    ports::{
        CredentialResolver, GitGateway, RunCompletedEvent, RunNotifier, SyncCatalog,
        SyncCatalogError, SyncRunRepository,
    },
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors returned by [`SyncExecutor::execute_by_key`] and [`SyncRunner`].
#[derive(Debug, Clone, Error)]
pub enum ExecuteError {
    /// No task is registered under the key; no run was recorded.
    #[error("sync task not found: {0}")]
    TaskNotFound(SyncTaskKey),
    /// The task could not be loaded.
    #[error(transparent)]
    Catalog(#[from] SyncCatalogError),
    /// The run could not be recorded.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The run completed without success.
    #[error("sync task {task} finished with status {status}: {message}")]
    RunFailed {
        /// Task that ran.
        task: SyncTaskKey,
        /// Terminal status of the run.
        status: RunStatus,
        /// Recorded error text.
        message: String,
    },
}

/// Anything that can execute a task on behalf of a trigger.
#[async_trait]
pub trait SyncRunner: Send + Sync + 'static {
    /// Executes the task and returns its successful run.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError::RunFailed`] when the run completed with a
    /// status other than success, or another [`ExecuteError`] when no run
    /// could be recorded.
    async fn run(&self, key: &SyncTaskKey, trigger: TriggerSource) -> Result<SyncRun, ExecuteError>;
}

/// Loads tasks, runs the engine, and records and announces the result.
pub struct SyncExecutor<C, L, G, A, N, K>
where
    C: SyncCatalog,
    L: SyncRunRepository,
    G: GitGateway,
    A: CredentialResolver,
    N: RunNotifier,
    K: Clock + Send + Sync,
{
    catalog: Arc<C>,
    ledger: RunLedger<L, K>,
    engine: FastForwardEngine<G, A, K>,
    notifier: Arc<N>,
}

impl<C, L, G, A, N, K> SyncExecutor<C, L, G, A, N, K>
where
    C: SyncCatalog,
    L: SyncRunRepository,
    G: GitGateway,
    A: CredentialResolver,
    N: RunNotifier,
    K: Clock + Send + Sync,
{
    /// Creates an executor.
    #[must_use]
    pub const fn new(
        catalog: Arc<C>,
        ledger: RunLedger<L, K>,
        engine: FastForwardEngine<G, A, K>,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            engine,
            notifier,
        }
    }

    /// Returns the ledger the executor records runs in.
    #[must_use]
    pub const fn ledger(&self) -> &RunLedger<L, K> {
        &self.ledger
    }

    /// Executes the task registered under `key`.
    ///
    /// Exactly one run is recorded for every call that finds the task, and
    /// it is always completed, whatever the engine reports.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError::TaskNotFound`] when no such task exists and
    /// [`ExecuteError::Catalog`] or [`ExecuteError::Ledger`] when the task
    /// or the run cannot be read or written. Unsuccessful syncs are not
    /// errors here; inspect [`SyncRun::status`].
    pub async fn execute_by_key(
        &self,
        key: &SyncTaskKey,
        trigger: TriggerSource,
    ) -> Result<SyncRun, ExecuteError> {
        let task = self
            .catalog
            .find_task(key)
            .await?
            .ok_or_else(|| ExecuteError::TaskNotFound(key.clone()))?;
        let run = self.ledger.begin(key, trigger).await?;
        info!(task = %key, run = %run.id(), trigger = %trigger, "sync run started");

        let repository_key = task.source().repository().clone();
        let mut log = ExecutionLog::new();
        let outcome = match self.load_context(task).await {
            Ok(context) => match self.engine.execute(&context, &mut log).await {
                Ok(range) => RunOutcome::Completed(range),
                Err(failure) => RunOutcome::Failed(failure),
            },
            Err(failure) => {
                warn!(task = %key, error = failure.message(), "sync task is misconfigured");
                RunOutcome::Failed(failure)
            }
        };

        let completed = self.ledger.complete(run, outcome, &log).await?;
        self.announce(&completed, repository_key).await;
        Ok(completed)
    }

    async fn load_context(&self, task: SyncTask) -> Result<SyncJobContext, SyncFailure> {
        let source_repository = self.repository(task.source().repository()).await?;
        let target_repository = self.repository(task.target().repository()).await?;
        Ok(SyncJobContext {
            task,
            source_repository,
            target_repository,
        })
    }

    async fn repository(&self, key: &RepositoryKey) -> Result<RepositoryRecord, SyncFailure> {
        let misconfigured =
            |message: String| SyncFailure::new(SyncFailureKind::InvalidConfiguration, message);
        self.catalog
            .find_repository(key)
            .await
            .map_err(|err| misconfigured(format!("repository {key} could not be loaded: {err}")))?
            .ok_or_else(|| misconfigured(format!("repository {key} is not registered")))
    }

    async fn announce(&self, run: &SyncRun, repository_key: RepositoryKey) {
        let event = RunCompletedEvent {
            task_key: run.task_key().clone(),
            repository_key,
            run_id: run.id(),
            trigger: run.trigger(),
            status: run.status(),
            commit_range: run.commit_range().to_owned(),
            error: run.error().map(str::to_owned),
        };
        if let Err(err) = self.notifier.notify(&event).await {
            warn!(task = %run.task_key(), run = %run.id(), error = %err, "run notification failed");
        }
    }
}

#[async_trait]
impl<C, L, G, A, N, K> SyncRunner for SyncExecutor<C, L, G, A, N, K>
where
    C: SyncCatalog + 'static,
    L: SyncRunRepository + 'static,
    G: GitGateway + 'static,
    A: CredentialResolver + 'static,
    N: RunNotifier + 'static,
    K: Clock + Send + Sync + 'static,
{
    async fn run(
        &self,
        key: &SyncTaskKey,
        trigger: TriggerSource,
    ) -> Result<SyncRun, ExecuteError> {
        let run = self.execute_by_key(key, trigger).await?;
        if run.status() == RunStatus::Success {
            return Ok(run);
        }
        Err(ExecuteError::RunFailed {
            task: key.clone(),
            status: run.status(),
            message: run.error().unwrap_or_default().to_owned(),
        })
    }
}
