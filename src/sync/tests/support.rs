//! Shared fixtures for sync service tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::{Clock, DefaultClock};

use crate::sync::{
    adapters::{
        credentials::RecordCredentialResolver,
        memory::{
            InMemoryGitGateway, InMemorySyncCatalog, InMemorySyncRunRepository,
            RecordingRunNotifier,
        },
    },
    domain::{
        BranchName, CommitHash, PushOptions, RemoteCredentials, RepositoryKey, RepositoryRecord,
        SyncEndpoint, SyncTask, SyncTaskKey, SyncTaskSettings,
    },
    ports::SyncCatalog,
    services::{FastForwardEngine, RunLedger, SyncExecutor},
};

pub(super) const WORK_REPO: &str = "/work/app";
pub(super) const ORIGIN_REPO: &str = "/remote/app.git";

pub(super) type TestEngine =
    FastForwardEngine<InMemoryGitGateway, RecordCredentialResolver, DefaultClock>;

pub(super) type TestExecutor<N = RecordingRunNotifier> = SyncExecutor<
    InMemorySyncCatalog,
    InMemorySyncRunRepository,
    InMemoryGitGateway,
    RecordCredentialResolver,
    N,
    DefaultClock,
>;

/// Clock that only moves when told to.
#[derive(Debug)]
pub(super) struct SteppingClock {
    now: Mutex<DateTime<Utc>>,
}

impl SteppingClock {
    pub(super) fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: TimeDelta) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for SteppingClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }
}

pub(super) fn branch(name: &str) -> BranchName {
    BranchName::new(name).expect("valid branch name")
}

pub(super) fn task_key(key: &str) -> SyncTaskKey {
    SyncTaskKey::new(key).expect("valid task key")
}

pub(super) fn endpoint(repository: &str, remote: &str, branch_name: &str) -> SyncEndpoint {
    SyncEndpoint::from_parts(repository, remote, branch_name).expect("valid endpoint")
}

pub(super) fn settings(source: SyncEndpoint, target: SyncEndpoint) -> SyncTaskSettings {
    SyncTaskSettings {
        source,
        target,
        push_options: PushOptions::default(),
        cron: None,
        enabled: true,
        webhook_token: None,
    }
}

/// A work repository with an `origin` remote, registered as `app`.
pub(super) struct GitFixture {
    pub(super) git: Arc<InMemoryGitGateway>,
    pub(super) catalog: Arc<InMemorySyncCatalog>,
    pub(super) runs: Arc<InMemorySyncRunRepository>,
    pub(super) notifier: Arc<RecordingRunNotifier>,
}

impl GitFixture {
    pub(super) async fn new() -> Self {
        let git = Arc::new(InMemoryGitGateway::new());
        git.init_repository(WORK_REPO).expect("work repository");
        git.init_repository(ORIGIN_REPO).expect("origin repository");
        git.add_remote(work(), "origin", ORIGIN_REPO)
            .expect("origin remote");
        let fixture = Self {
            git,
            catalog: Arc::new(InMemorySyncCatalog::new()),
            runs: Arc::new(InMemorySyncRunRepository::new()),
            notifier: Arc::new(RecordingRunNotifier::new()),
        };
        fixture.register("app", WORK_REPO, None).await;
        fixture
    }

    pub(super) async fn register(
        &self,
        key: &str,
        path: &str,
        url: Option<&str>,
    ) -> RepositoryRecord {
        let record = RepositoryRecord::new(
            RepositoryKey::new(key).expect("valid repository key"),
            path,
            url.map(str::to_owned),
            RemoteCredentials::anonymous(),
            &DefaultClock,
        )
        .expect("valid repository record");
        self.catalog
            .store_repository(&record)
            .await
            .expect("repository stored");
        record
    }

    pub(super) async fn store_task(&self, key: &str, task_settings: SyncTaskSettings) -> SyncTask {
        let task = SyncTask::new(task_key(key), task_settings, &DefaultClock).expect("valid task");
        self.catalog.store_task(&task).await.expect("task stored");
        task
    }

    /// Commits `count` changes on top of `branch_name` in the given repository.
    pub(super) fn commits(&self, repo: &str, branch_name: &str, count: usize) -> CommitHash {
        let target = branch(branch_name);
        let mut head = None;
        for index in 0..count {
            let path = format!("{branch_name}-{index}.txt");
            let content = format!("{repo} {branch_name} {index}");
            head = Some(
                self.git
                    .commit(
                        Path::new(repo),
                        &target,
                        &format!("commit {index}"),
                        &[(path.as_str(), Some(content.as_str()))],
                    )
                    .expect("commit created"),
            );
        }
        head.expect("at least one commit")
    }

    pub(super) fn head(&self, repo: &str, branch_name: &str) -> Option<CommitHash> {
        self.git
            .ref_target(Path::new(repo), &branch(branch_name).head_ref())
            .expect("ref lookup")
    }

    pub(super) fn engine(&self) -> TestEngine {
        FastForwardEngine::new(
            Arc::clone(&self.git),
            Arc::new(RecordCredentialResolver::new()),
            Arc::new(DefaultClock),
        )
    }

    pub(super) fn executor(&self) -> TestExecutor {
        self.executor_with(Arc::clone(&self.notifier))
    }

    pub(super) fn executor_with<N: crate::sync::ports::RunNotifier>(
        &self,
        notifier: Arc<N>,
    ) -> TestExecutor<N> {
        SyncExecutor::new(
            Arc::clone(&self.catalog),
            RunLedger::new(Arc::clone(&self.runs), Arc::new(DefaultClock)),
            self.engine(),
            notifier,
        )
    }
}

pub(super) fn work() -> &'static Path {
    Path::new(WORK_REPO)
}

pub(super) fn origin() -> PathBuf {
    PathBuf::from(ORIGIN_REPO)
}
