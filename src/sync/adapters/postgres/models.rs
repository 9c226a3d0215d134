//! Diesel row models for sync persistence.

use super::schema::{sync_repositories, sync_runs, sync_tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Row of the `sync_repositories` table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = sync_repositories, primary_key(repository_key))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RepositoryRow {
    /// Repository key.
    pub repository_key: String,
    /// Working repository path.
    pub path: String,
    /// Fallback remote URL.
    pub registered_url: Option<String>,
    /// Credential set payload.
    pub credentials: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Row of the `sync_tasks` table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = sync_tasks, primary_key(task_key))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct TaskRow {
    /// Task key.
    pub task_key: String,
    /// Source repository key.
    pub source_repository: String,
    /// Source remote name.
    pub source_remote: String,
    /// Source branch name.
    pub source_branch: String,
    /// Target repository key.
    pub target_repository: String,
    /// Target remote name.
    pub target_remote: String,
    /// Target branch name.
    pub target_branch: String,
    /// Push option list.
    pub push_options: Value,
    /// Cron expression as entered.
    pub cron: Option<String>,
    /// Whether scheduled runs are enabled.
    pub enabled: bool,
    /// Webhook token.
    pub webhook_token: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Row of the `sync_runs` table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = sync_runs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct RunRow {
    /// Run identifier.
    pub id: uuid::Uuid,
    /// Key of the task that ran.
    pub task_key: String,
    /// Trigger source.
    pub trigger_source: String,
    /// Run status.
    pub status: String,
    /// Reported commit range.
    pub commit_range: String,
    /// Failure kind of an unsuccessful run.
    pub failure_kind: Option<String>,
    /// Error text of an unsuccessful run.
    pub error: Option<String>,
    /// Execution log.
    pub log: String,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// Completion timestamp.
    pub finished_at: Option<DateTime<Utc>>,
}
