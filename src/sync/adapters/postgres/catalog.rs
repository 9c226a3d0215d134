//! `PostgreSQL` catalog of sync tasks and repository records.

use super::{
    SyncPgPool,
    models::{RepositoryRow, TaskRow},
    schema::{sync_repositories, sync_tasks},
};
use crate::sync::{
    domain::{
        CronExpression, PersistedRepositoryData, PersistedSyncTaskData, PushOptions,
        RemoteCredentials, RepositoryKey, RepositoryRecord, SyncEndpoint, SyncTask, SyncTaskKey,
        WebhookToken,
    },
    ports::{SyncCatalog, SyncCatalogError, SyncCatalogResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};
use std::path::PathBuf;

const WEBHOOK_TOKEN_CONSTRAINT: &str = "idx_sync_tasks_webhook_token_unique";

/// `PostgreSQL`-backed sync catalog.
#[derive(Debug, Clone)]
pub struct PostgresSyncCatalog {
    pool: SyncPgPool,
}

impl PostgresSyncCatalog {
    /// Creates a catalog from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: SyncPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> SyncCatalogResult<T>
    where
        F: FnOnce(&mut PgConnection) -> SyncCatalogResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(SyncCatalogError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(SyncCatalogError::persistence)?
    }
}

#[async_trait]
impl SyncCatalog for PostgresSyncCatalog {
    async fn store_repository(&self, repository: &RepositoryRecord) -> SyncCatalogResult<()> {
        let key = repository.key().clone();
        let row = to_repository_row(repository)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(sync_repositories::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        SyncCatalogError::DuplicateRepository(key.clone())
                    }
                    _ => SyncCatalogError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update_repository(&self, repository: &RepositoryRecord) -> SyncCatalogResult<()> {
        let key = repository.key().clone();
        let row = to_repository_row(repository)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                sync_repositories::table
                    .filter(sync_repositories::repository_key.eq(key.as_str())),
            )
            .set(&row)
            .execute(connection)
            .map_err(SyncCatalogError::persistence)?;
            if updated == 0 {
                return Err(SyncCatalogError::RepositoryNotFound(key));
            }
            Ok(())
        })
        .await
    }

    async fn find_repository(
        &self,
        key: &RepositoryKey,
    ) -> SyncCatalogResult<Option<RepositoryRecord>> {
        let lookup = key.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = sync_repositories::table
                .filter(sync_repositories::repository_key.eq(lookup))
                .select(RepositoryRow::as_select())
                .first::<RepositoryRow>(connection)
                .optional()
                .map_err(SyncCatalogError::persistence)?;
            row.map(row_to_repository).transpose()
        })
        .await
    }

    async fn list_repositories(&self) -> SyncCatalogResult<Vec<RepositoryRecord>> {
        self.run_blocking(move |connection| {
            sync_repositories::table
                .order(sync_repositories::repository_key.asc())
                .select(RepositoryRow::as_select())
                .load::<RepositoryRow>(connection)
                .map_err(SyncCatalogError::persistence)?
                .into_iter()
                .map(row_to_repository)
                .collect()
        })
        .await
    }

    async fn store_task(&self, task: &SyncTask) -> SyncCatalogResult<()> {
        let key = task.key().clone();
        let row = to_task_row(task)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(sync_tasks::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| map_task_write_error(err, &key))?;
            Ok(())
        })
        .await
    }

    async fn update_task(&self, task: &SyncTask) -> SyncCatalogResult<()> {
        let key = task.key().clone();
        let row = to_task_row(task)?;
        self.run_blocking(move |connection| {
            let updated =
                diesel::update(sync_tasks::table.filter(sync_tasks::task_key.eq(key.as_str())))
                    .set(&row)
                    .execute(connection)
                    .map_err(|err| map_task_write_error(err, &key))?;
            if updated == 0 {
                return Err(SyncCatalogError::TaskNotFound(key));
            }
            Ok(())
        })
        .await
    }

    async fn delete_task(&self, key: &SyncTaskKey) -> SyncCatalogResult<bool> {
        let lookup = key.as_str().to_owned();
        self.run_blocking(move |connection| {
            let deleted =
                diesel::delete(sync_tasks::table.filter(sync_tasks::task_key.eq(lookup)))
                    .execute(connection)
                    .map_err(SyncCatalogError::persistence)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn find_task(&self, key: &SyncTaskKey) -> SyncCatalogResult<Option<SyncTask>> {
        let lookup = key.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = sync_tasks::table
                .filter(sync_tasks::task_key.eq(lookup))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(SyncCatalogError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn find_task_by_webhook_token(
        &self,
        token: &str,
    ) -> SyncCatalogResult<Option<SyncTask>> {
        let lookup = token.to_owned();
        self.run_blocking(move |connection| {
            let row = sync_tasks::table
                .filter(sync_tasks::webhook_token.eq(lookup))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(SyncCatalogError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn list_tasks(&self) -> SyncCatalogResult<Vec<SyncTask>> {
        self.run_blocking(move |connection| {
            sync_tasks::table
                .order(sync_tasks::task_key.asc())
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)
                .map_err(SyncCatalogError::persistence)?
                .into_iter()
                .map(row_to_task)
                .collect()
        })
        .await
    }
}

fn map_task_write_error(err: DieselError, key: &SyncTaskKey) -> SyncCatalogError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
            if is_webhook_token_violation(info.as_ref()) =>
        {
            SyncCatalogError::DuplicateWebhookToken
        }
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            SyncCatalogError::DuplicateTask(key.clone())
        }
        _ => SyncCatalogError::persistence(err),
    }
}

fn is_webhook_token_violation(info: &dyn DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == WEBHOOK_TOKEN_CONSTRAINT)
}

fn to_repository_row(repository: &RepositoryRecord) -> SyncCatalogResult<RepositoryRow> {
    let path = repository
        .path()
        .to_str()
        .ok_or_else(|| {
            SyncCatalogError::persistence(std::io::Error::other(
                "repository path is not valid UTF-8",
            ))
        })?
        .to_owned();
    let credentials =
        serde_json::to_value(repository.credentials()).map_err(SyncCatalogError::persistence)?;
    Ok(RepositoryRow {
        repository_key: repository.key().as_str().to_owned(),
        path,
        registered_url: repository.registered_url().map(str::to_owned),
        credentials,
        created_at: repository.created_at(),
        updated_at: repository.updated_at(),
    })
}

fn row_to_repository(row: RepositoryRow) -> SyncCatalogResult<RepositoryRecord> {
    let RepositoryRow {
        repository_key,
        path,
        registered_url,
        credentials: persisted_credentials,
        created_at,
        updated_at,
    } = row;
    let key = RepositoryKey::new(repository_key).map_err(SyncCatalogError::invalid_persisted_data)?;
    let credentials = serde_json::from_value::<RemoteCredentials>(persisted_credentials)
        .map_err(SyncCatalogError::invalid_persisted_data)?;
    Ok(RepositoryRecord::from_persisted(PersistedRepositoryData {
        key,
        path: PathBuf::from(path),
        registered_url,
        credentials,
        created_at,
        updated_at,
    }))
}

fn to_task_row(task: &SyncTask) -> SyncCatalogResult<TaskRow> {
    let push_options =
        serde_json::to_value(task.push_options()).map_err(SyncCatalogError::persistence)?;
    let source = task.source();
    let target = task.target();
    Ok(TaskRow {
        task_key: task.key().as_str().to_owned(),
        source_repository: source.repository().as_str().to_owned(),
        source_remote: source.remote().as_str().to_owned(),
        source_branch: source.branch().as_str().to_owned(),
        target_repository: target.repository().as_str().to_owned(),
        target_remote: target.remote().as_str().to_owned(),
        target_branch: target.branch().as_str().to_owned(),
        push_options,
        cron: task.cron().map(|cron| cron.as_str().to_owned()),
        enabled: task.enabled(),
        webhook_token: task.webhook_token().map(|token| token.as_str().to_owned()),
        created_at: task.created_at(),
        updated_at: task.updated_at(),
    })
}

fn row_to_task(row: TaskRow) -> SyncCatalogResult<SyncTask> {
    let TaskRow {
        task_key,
        source_repository,
        source_remote,
        source_branch,
        target_repository,
        target_remote,
        target_branch,
        push_options: persisted_push_options,
        cron: persisted_cron,
        enabled,
        webhook_token: persisted_webhook_token,
        created_at,
        updated_at,
    } = row;

    let key = SyncTaskKey::new(task_key).map_err(SyncCatalogError::invalid_persisted_data)?;
    let source = SyncEndpoint::from_parts(&source_repository, &source_remote, &source_branch)
        .map_err(SyncCatalogError::invalid_persisted_data)?;
    let target = SyncEndpoint::from_parts(&target_repository, &target_remote, &target_branch)
        .map_err(SyncCatalogError::invalid_persisted_data)?;
    let push_options = serde_json::from_value::<PushOptions>(persisted_push_options)
        .map_err(SyncCatalogError::invalid_persisted_data)?;
    let cron = persisted_cron
        .as_deref()
        .map(CronExpression::parse_optional)
        .transpose()
        .map_err(SyncCatalogError::invalid_persisted_data)?
        .flatten();
    let webhook_token = persisted_webhook_token
        .map(WebhookToken::new)
        .transpose()
        .map_err(SyncCatalogError::invalid_persisted_data)?;

    Ok(SyncTask::from_persisted(PersistedSyncTaskData {
        key,
        source,
        target,
        push_options,
        cron,
        enabled,
        webhook_token,
        created_at,
        updated_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::domain::{CredentialSpec, RemoteName, Secret, SyncTaskSettings};
    use mockable::DefaultClock;
    use rstest::rstest;

    fn sample_task() -> SyncTask {
        let settings = SyncTaskSettings {
            source: SyncEndpoint::from_parts("app", "local", "feature").expect("valid source"),
            target: SyncEndpoint::from_parts("app", "origin", "main").expect("valid target"),
            push_options: PushOptions::new(["--force-with-lease".to_owned()])
                .expect("valid options"),
            cron: Some(CronExpression::new("*/5 * * * *").expect("valid cron")),
            enabled: true,
            webhook_token: Some(WebhookToken::new("0123456789abcdef").expect("valid token")),
        };
        SyncTask::new(
            SyncTaskKey::new("app-main").expect("valid key"),
            settings,
            &DefaultClock,
        )
        .expect("valid task")
    }

    #[rstest]
    fn task_rows_reconstruct_the_original_task() {
        let task = sample_task();

        let row = to_task_row(&task).expect("row conversion");
        let restored = row_to_task(row).expect("task conversion");

        assert_eq!(restored, task);
    }

    #[rstest]
    fn task_rows_with_an_invalid_cron_are_rejected() {
        let mut row = to_task_row(&sample_task()).expect("row conversion");
        row.cron = Some("not a schedule".to_owned());

        assert!(matches!(
            row_to_task(row),
            Err(SyncCatalogError::InvalidPersistedData(_))
        ));
    }

    #[rstest]
    #[case("")]
    #[case("  ")]
    fn task_rows_with_a_blank_cron_are_unscheduled(#[case] stored: &str) {
        let mut row = to_task_row(&sample_task()).expect("row conversion");
        row.cron = Some(stored.to_owned());

        let restored = row_to_task(row).expect("task conversion");

        assert_eq!(restored.cron(), None);
        assert!(!restored.is_schedulable());
    }

    #[rstest]
    fn repository_rows_keep_credentials() {
        let credentials = RemoteCredentials::anonymous().with_override(
            RemoteName::new("origin").expect("valid remote"),
            CredentialSpec::Token {
                username: "bot".to_owned(),
                token: Secret::new("s3cret"),
            },
        );
        let record = RepositoryRecord::new(
            RepositoryKey::new("app").expect("valid key"),
            "/srv/git/app",
            Some("https://example.com/app.git".to_owned()),
            credentials,
            &DefaultClock,
        )
        .expect("valid record");

        let row = to_repository_row(&record).expect("row conversion");
        let restored = row_to_repository(row).expect("record conversion");

        assert_eq!(restored, record);
    }
}
