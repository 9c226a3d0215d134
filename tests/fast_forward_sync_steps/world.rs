//! Shared world state for fast-forward synchronisation scenarios.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use mockable::DefaultClock;
use refsync::sync::{
    adapters::{
        credentials::RecordCredentialResolver,
        memory::{
            InMemoryGitGateway, InMemorySyncCatalog, InMemorySyncRunRepository,
            RecordingRunNotifier,
        },
    },
    domain::{BranchName, CommitHash, SyncRun},
    ports::NoopScheduleHook,
    services::{ExecuteError, FastForwardEngine, RunLedger, SyncExecutor, SyncTaskService},
};
use rstest::fixture;

/// Path of the working repository.
pub const WORK_REPO: &str = "/work/app";
/// Path of the bare repository behind the `origin` remote.
pub const ORIGIN_REPO: &str = "/remote/app.git";

/// Executor type used by the BDD world.
pub type TestExecutor = SyncExecutor<
    InMemorySyncCatalog,
    InMemorySyncRunRepository,
    InMemoryGitGateway,
    RecordCredentialResolver,
    RecordingRunNotifier,
    DefaultClock,
>;

/// Registration service type used by the BDD world.
pub type TestService = SyncTaskService<InMemorySyncCatalog, NoopScheduleHook, DefaultClock>;

/// Scenario world for synchronisation behaviour tests.
pub struct SyncWorld {
    pub git: Arc<InMemoryGitGateway>,
    pub runs: Arc<InMemorySyncRunRepository>,
    pub service: TestService,
    pub executor: TestExecutor,
    pub commits: HashMap<String, CommitHash>,
    pub last_run: Option<Result<SyncRun, ExecuteError>>,
}

impl SyncWorld {
    /// Creates a world with an empty git universe and catalog.
    #[must_use]
    pub fn new() -> Self {
        let git = Arc::new(InMemoryGitGateway::new());
        let catalog = Arc::new(InMemorySyncCatalog::new());
        let runs = Arc::new(InMemorySyncRunRepository::new());
        let clock = Arc::new(DefaultClock);
        let executor = SyncExecutor::new(
            Arc::clone(&catalog),
            RunLedger::new(Arc::clone(&runs), Arc::clone(&clock)),
            FastForwardEngine::new(
                Arc::clone(&git),
                Arc::new(RecordCredentialResolver::new()),
                Arc::clone(&clock),
            ),
            Arc::new(RecordingRunNotifier::new()),
        );
        let service = SyncTaskService::new(catalog, Arc::new(NoopScheduleHook), clock);

        Self {
            git,
            runs,
            service,
            executor,
            commits: HashMap::new(),
            last_run: None,
        }
    }

    /// Returns the hash recorded under `label`.
    ///
    /// # Errors
    ///
    /// Returns an error when no commit carries the label.
    pub fn commit(&self, label: &str) -> Result<CommitHash, eyre::Report> {
        self.commits
            .get(label)
            .cloned()
            .ok_or_else(|| eyre::eyre!("no commit labelled {label} in scenario world"))
    }

    /// Returns the branch head in the repository at `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid branch names or unknown repositories.
    pub fn head(&self, repo: &str, branch: &str) -> Result<Option<CommitHash>, eyre::Report> {
        let name = BranchName::new(branch)?;
        Ok(self.git.ref_target(Path::new(repo), &name.head_ref())?)
    }
}

impl Default for SyncWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SyncWorld {
    SyncWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
