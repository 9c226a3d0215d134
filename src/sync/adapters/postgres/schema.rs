//! Diesel schema for sync persistence.

diesel::table! {
    /// Registered repositories with their credential sets.
    sync_repositories (repository_key) {
        /// Repository key.
        #[max_length = 100]
        repository_key -> Varchar,
        /// Working repository path.
        path -> Text,
        /// Fallback remote URL.
        registered_url -> Nullable<Text>,
        /// Credential set payload.
        credentials -> Jsonb,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Sync task definitions.
    sync_tasks (task_key) {
        /// Task key.
        #[max_length = 100]
        task_key -> Varchar,
        /// Source repository key.
        #[max_length = 100]
        source_repository -> Varchar,
        /// Source remote name.
        #[max_length = 255]
        source_remote -> Varchar,
        /// Source branch name.
        #[max_length = 255]
        source_branch -> Varchar,
        /// Target repository key.
        #[max_length = 100]
        target_repository -> Varchar,
        /// Target remote name.
        #[max_length = 255]
        target_remote -> Varchar,
        /// Target branch name.
        #[max_length = 255]
        target_branch -> Varchar,
        /// Push option list.
        push_options -> Jsonb,
        /// Cron expression as entered.
        #[max_length = 255]
        cron -> Nullable<Varchar>,
        /// Whether scheduled runs are enabled.
        enabled -> Bool,
        /// Webhook token.
        #[max_length = 255]
        webhook_token -> Nullable<Varchar>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Run ledger entries.
    sync_runs (id) {
        /// Run identifier.
        id -> Uuid,
        /// Key of the task that ran.
        #[max_length = 100]
        task_key -> Varchar,
        /// Trigger source.
        #[max_length = 20]
        trigger_source -> Varchar,
        /// Run status.
        #[max_length = 20]
        status -> Varchar,
        /// Reported commit range.
        commit_range -> Text,
        /// Failure kind of an unsuccessful run.
        #[max_length = 50]
        failure_kind -> Nullable<Varchar>,
        /// Error text of an unsuccessful run.
        error -> Nullable<Text>,
        /// Execution log.
        log -> Text,
        /// Start timestamp.
        started_at -> Timestamptz,
        /// Completion timestamp.
        finished_at -> Nullable<Timestamptz>,
    }
}
