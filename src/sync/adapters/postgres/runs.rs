//! `PostgreSQL` run ledger.

use super::{SyncPgPool, models::RunRow, schema::sync_runs};
use crate::sync::{
    domain::{
        PersistedSyncRunData, RunStatus, SyncFailureKind, SyncRun, SyncRunId, SyncTaskKey,
        TriggerSource,
    },
    ports::{SyncRunRepository, SyncRunRepositoryError, SyncRunRepositoryResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL`-backed run repository.
#[derive(Debug, Clone)]
pub struct PostgresSyncRunRepository {
    pool: SyncPgPool,
}

impl PostgresSyncRunRepository {
    /// Creates a repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: SyncPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> SyncRunRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> SyncRunRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(SyncRunRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(SyncRunRepositoryError::persistence)?
    }
}

#[async_trait]
impl SyncRunRepository for PostgresSyncRunRepository {
    async fn create(&self, run: &SyncRun) -> SyncRunRepositoryResult<()> {
        let run_id = run.id();
        let row = to_row(run);
        self.run_blocking(move |connection| {
            diesel::insert_into(sync_runs::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        SyncRunRepositoryError::DuplicateRun(run_id)
                    }
                    _ => SyncRunRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, run: &SyncRun) -> SyncRunRepositoryResult<()> {
        let run_id = run.id();
        let row = to_row(run);
        self.run_blocking(move |connection| {
            let updated =
                diesel::update(sync_runs::table.filter(sync_runs::id.eq(run_id.into_inner())))
                    .set(&row)
                    .execute(connection)
                    .map_err(SyncRunRepositoryError::persistence)?;
            if updated == 0 {
                return Err(SyncRunRepositoryError::NotFound(run_id));
            }
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: SyncRunId) -> SyncRunRepositoryResult<Option<SyncRun>> {
        self.run_blocking(move |connection| {
            let row = sync_runs::table
                .filter(sync_runs::id.eq(id.into_inner()))
                .select(RunRow::as_select())
                .first::<RunRow>(connection)
                .optional()
                .map_err(SyncRunRepositoryError::persistence)?;
            row.map(row_to_run).transpose()
        })
        .await
    }

    async fn list_for_task(
        &self,
        task_key: &SyncTaskKey,
        limit: usize,
    ) -> SyncRunRepositoryResult<Vec<SyncRun>> {
        let lookup = task_key.as_str().to_owned();
        let row_limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run_blocking(move |connection| {
            sync_runs::table
                .filter(sync_runs::task_key.eq(lookup))
                .order(sync_runs::started_at.desc())
                .limit(row_limit)
                .select(RunRow::as_select())
                .load::<RunRow>(connection)
                .map_err(SyncRunRepositoryError::persistence)?
                .into_iter()
                .map(row_to_run)
                .collect()
        })
        .await
    }

    async fn list_running(&self) -> SyncRunRepositoryResult<Vec<SyncRun>> {
        self.run_blocking(move |connection| {
            sync_runs::table
                .filter(sync_runs::status.eq(RunStatus::Running.as_str()))
                .order(sync_runs::started_at.asc())
                .select(RunRow::as_select())
                .load::<RunRow>(connection)
                .map_err(SyncRunRepositoryError::persistence)?
                .into_iter()
                .map(row_to_run)
                .collect()
        })
        .await
    }
}

fn to_row(run: &SyncRun) -> RunRow {
    RunRow {
        id: run.id().into_inner(),
        task_key: run.task_key().as_str().to_owned(),
        trigger_source: run.trigger().as_str().to_owned(),
        status: run.status().as_str().to_owned(),
        commit_range: run.commit_range().to_owned(),
        failure_kind: run.failure_kind().map(|kind| kind.as_str().to_owned()),
        error: run.error().map(str::to_owned),
        log: run.log().to_owned(),
        started_at: run.started_at(),
        finished_at: run.finished_at(),
    }
}

fn row_to_run(row: RunRow) -> SyncRunRepositoryResult<SyncRun> {
    let RunRow {
        id,
        task_key: persisted_task_key,
        trigger_source,
        status: persisted_status,
        commit_range,
        failure_kind: persisted_failure_kind,
        error,
        log,
        started_at,
        finished_at,
    } = row;

    let task_key = SyncTaskKey::new(persisted_task_key)
        .map_err(SyncRunRepositoryError::invalid_persisted_data)?;
    let trigger = TriggerSource::try_from(trigger_source.as_str())
        .map_err(SyncRunRepositoryError::invalid_persisted_data)?;
    let status = RunStatus::try_from(persisted_status.as_str())
        .map_err(SyncRunRepositoryError::invalid_persisted_data)?;
    let failure_kind = persisted_failure_kind
        .as_deref()
        .map(SyncFailureKind::try_from)
        .transpose()
        .map_err(SyncRunRepositoryError::invalid_persisted_data)?;

    Ok(SyncRun::from_persisted(PersistedSyncRunData {
        id: SyncRunId::from_uuid(id),
        task_key,
        trigger,
        status,
        commit_range,
        failure_kind,
        error,
        log,
        started_at,
        finished_at,
    }))
}
