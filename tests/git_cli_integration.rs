//! Integration tests running the git CLI gateway and the executor against
//! real repositories in a temporary directory.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use mockable::DefaultClock;
use refsync::sync::{
    adapters::{
        credentials::RecordCredentialResolver,
        git_cli::GitCliGateway,
        memory::{InMemorySyncCatalog, InMemorySyncRunRepository},
        notifier::TracingRunNotifier,
    },
    domain::{
        BranchName, CommitHash, PushOptions, RemoteCredentials, RemoteName, RepositoryKey,
        RunStatus, SyncEndpoint, SyncFailureKind, SyncTaskKey, SyncTaskSettings, TriggerSource,
    },
    ports::{
        ChangeKind, FetchOutcome, FetchRequest, GitGateway, NoopScheduleHook, PushOutcome,
        PushRequest,
    },
    services::{
        FastForwardEngine, MergeRequest, MergeService, RepositoryRegistration, RunLedger,
        SyncExecutor, SyncTaskService,
    },
};
use rstest::{fixture, rstest};
use tempfile::TempDir;

/// A bare `origin` plus a work clone with `main` checked out.
struct Sandbox {
    _dir: TempDir,
    work: PathBuf,
    origin: PathBuf,
}

impl Sandbox {
    fn commit(&self, repo: &Path, file: &str, content: &str) -> CommitHash {
        std::fs::write(repo.join(file), content).expect("write file");
        git(repo, &["add", file]);
        git(repo, &["commit", "--quiet", "-m", &format!("update {file}")]);
        CommitHash::new(git(repo, &["rev-parse", "HEAD"])).expect("commit hash")
    }

    fn origin_head(&self, branch: &str) -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.origin)
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .output()
            .expect("spawn git");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    fn origin_url(&self) -> String {
        self.origin.display().to_string()
    }
}

fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

#[fixture]
fn sandbox() -> Sandbox {
    let dir = tempfile::tempdir().expect("temp dir");
    let origin = dir.path().join("origin.git");
    let work = dir.path().join("work");
    git(dir.path(), &["init", "--quiet", "--bare", "origin.git"]);
    git(dir.path(), &["init", "--quiet", "--initial-branch=main", "work"]);
    git(&work, &["config", "user.name", "Refsync Tests"]);
    git(&work, &["config", "user.email", "refsync@example.invalid"]);
    git(&work, &["config", "commit.gpgsign", "false"]);
    git(
        &work,
        &["remote", "add", "origin", &origin.display().to_string()],
    );
    Sandbox {
        _dir: dir,
        work,
        origin,
    }
}

fn fetch_main(sandbox: &Sandbox) -> FetchRequest {
    FetchRequest {
        url: sandbox.origin_url(),
        remote_ref: "refs/heads/main".to_owned(),
        tracking_ref: "refs/remotes/origin/main".to_owned(),
        credential: None,
    }
}

fn push_main(sandbox: &Sandbox, commit: &CommitHash) -> PushRequest {
    PushRequest {
        url: sandbox.origin_url(),
        commit: commit.clone(),
        destination_ref: "refs/heads/main".to_owned(),
        options: Vec::new(),
        credential: None,
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remote_urls_resolve_and_unknown_remotes_are_absent(sandbox: Sandbox) {
    let gateway = GitCliGateway::default();

    let origin = gateway
        .remote_url(&sandbox.work, &RemoteName::new("origin").expect("remote"))
        .await
        .expect("origin url");
    let upstream = gateway
        .remote_url(&sandbox.work, &RemoteName::new("upstream").expect("remote"))
        .await
        .expect("upstream lookup");

    assert_eq!(origin, Some(sandbox.origin_url()));
    assert_eq!(upstream, None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn push_then_fetch_mirrors_the_branch(sandbox: Sandbox) {
    let gateway = GitCliGateway::default();
    let first = sandbox.commit(&sandbox.work, "README.md", "hello\n");

    assert_eq!(
        gateway
            .fetch(&sandbox.work, &fetch_main(&sandbox))
            .await
            .expect("fetch empty origin"),
        FetchOutcome::MissingRemoteRef
    );
    assert_eq!(
        gateway
            .push(&sandbox.work, &push_main(&sandbox, &first))
            .await
            .expect("first push"),
        PushOutcome::Pushed
    );
    assert_eq!(
        gateway
            .push(&sandbox.work, &push_main(&sandbox, &first))
            .await
            .expect("repeated push"),
        PushOutcome::UpToDate
    );
    assert_eq!(
        gateway
            .fetch(&sandbox.work, &fetch_main(&sandbox))
            .await
            .expect("fetch"),
        FetchOutcome::Fetched
    );
    assert_eq!(
        gateway
            .resolve_ref(&sandbox.work, "refs/remotes/origin/main")
            .await
            .expect("tracking ref"),
        Some(first)
    );
    assert_eq!(
        gateway
            .resolve_ref(&sandbox.work, "refs/heads/missing")
            .await
            .expect("missing ref"),
        None
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn history_queries_reflect_the_commit_graph(sandbox: Sandbox) {
    let gateway = GitCliGateway::default();
    let base = sandbox.commit(&sandbox.work, "a.txt", "one\n");
    let tip = sandbox.commit(&sandbox.work, "b.txt", "two\n");

    assert!(gateway.is_ancestor(&sandbox.work, &base, &tip).await.expect("ancestry"));
    assert!(!gateway.is_ancestor(&sandbox.work, &tip, &base).await.expect("ancestry"));
    assert_eq!(
        gateway.merge_base(&sandbox.work, &base, &tip).await.expect("merge base"),
        Some(base.clone())
    );

    let changes = gateway
        .changed_paths(&sandbox.work, &base, &tip)
        .await
        .expect("diff");
    assert_eq!(changes.len(), 1);
    assert!(
        changes
            .first()
            .is_some_and(|change| change.path == "b.txt" && change.kind == ChangeKind::Added)
    );
    assert_eq!(
        gateway.current_branch(&sandbox.work).await.expect("branch"),
        Some(BranchName::new("main").expect("branch"))
    );
}

type CliExecutor = SyncExecutor<
    InMemorySyncCatalog,
    InMemorySyncRunRepository,
    GitCliGateway,
    RecordCredentialResolver,
    TracingRunNotifier,
    DefaultClock,
>;

async fn executor_for(sandbox: &Sandbox) -> (CliExecutor, SyncTaskKey) {
    let catalog = Arc::new(InMemorySyncCatalog::new());
    let clock = Arc::new(DefaultClock);
    let service = SyncTaskService::new(
        Arc::clone(&catalog),
        Arc::new(NoopScheduleHook),
        Arc::clone(&clock),
    );
    service
        .register_repository(RepositoryRegistration {
            key: RepositoryKey::new("app").expect("repository key"),
            path: sandbox.work.clone(),
            registered_url: None,
            credentials: RemoteCredentials::anonymous(),
        })
        .await
        .expect("register repository");
    let key = SyncTaskKey::new("publish-main").expect("task key");
    service
        .create_task(
            key.clone(),
            SyncTaskSettings {
                source: SyncEndpoint::from_parts("app", "local", "main").expect("source"),
                target: SyncEndpoint::from_parts("app", "origin", "main").expect("target"),
                push_options: PushOptions::default(),
                cron: None,
                enabled: true,
                webhook_token: None,
            },
        )
        .await
        .expect("create task");

    let executor = SyncExecutor::new(
        catalog,
        RunLedger::new(Arc::new(InMemorySyncRunRepository::new()), Arc::clone(&clock)),
        FastForwardEngine::new(
            Arc::new(GitCliGateway::default()),
            Arc::new(RecordCredentialResolver::new()),
            clock,
        ),
        Arc::new(TracingRunNotifier::new()),
    );
    (executor, key)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn executor_fast_forwards_a_real_remote(sandbox: Sandbox) {
    let published = sandbox.commit(&sandbox.work, "README.md", "v1\n");
    git(&sandbox.work, &["push", "--quiet", "origin", "main"]);
    let local = sandbox.commit(&sandbox.work, "README.md", "v2\n");
    let (executor, key) = executor_for(&sandbox).await;

    let run = executor
        .execute_by_key(&key, TriggerSource::Manual)
        .await
        .expect("run recorded");

    assert_eq!(run.status(), RunStatus::Success);
    assert_eq!(run.commit_range(), format!("{published}..{local}"));
    assert_eq!(sandbox.origin_head("main"), Some(local.to_string()));

    let repeat = executor
        .execute_by_key(&key, TriggerSource::Manual)
        .await
        .expect("second run recorded");
    assert_eq!(repeat.status(), RunStatus::Success);
    assert_eq!(repeat.commit_range(), "");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn executor_refuses_to_rewrite_diverged_history(sandbox: Sandbox) {
    sandbox.commit(&sandbox.work, "README.md", "v1\n");
    sandbox.commit(&sandbox.work, "README.md", "v2\n");
    git(&sandbox.work, &["push", "--quiet", "origin", "main"]);
    git(&sandbox.work, &["commit", "--quiet", "--amend", "-m", "rewritten"]);
    let published = sandbox.origin_head("main");
    let (executor, key) = executor_for(&sandbox).await;

    let run = executor
        .execute_by_key(&key, TriggerSource::Manual)
        .await
        .expect("run recorded");

    assert_eq!(run.status(), RunStatus::Conflict);
    assert_eq!(run.failure_kind(), Some(SyncFailureKind::Conflict));
    assert_eq!(sandbox.origin_head("main"), published);
}

fn squash_into_main(sandbox: &Sandbox, source_ref: &str) -> MergeRequest {
    MergeRequest {
        repo_path: sandbox.work.clone(),
        source_ref: source_ref.to_owned(),
        target_branch: BranchName::new("main").expect("branch"),
        squash: true,
        message: "squash topic".to_owned(),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn squash_merge_commits_topic_changes_onto_main(sandbox: Sandbox) {
    let base = sandbox.commit(&sandbox.work, "README.md", "base\n");
    git(&sandbox.work, &["checkout", "--quiet", "-b", "topic"]);
    sandbox.commit(&sandbox.work, "topic.txt", "topic\n");
    git(&sandbox.work, &["checkout", "--quiet", "main"]);
    let service = MergeService::new(Arc::new(GitCliGateway::default()));

    let outcome = service
        .merge(&squash_into_main(&sandbox, "refs/heads/topic"))
        .await
        .expect("squash merge");

    assert_ne!(outcome.head, base);
    assert_eq!(outcome.merge_base, base);
    assert_eq!(
        git(&sandbox.work, &["rev-parse", &format!("{}^", outcome.head)]),
        base.to_string()
    );
    assert_eq!(git(&sandbox.work, &["rev-list", "--count", "main"]), "2");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn squashing_an_already_merged_source_keeps_the_head(sandbox: Sandbox) {
    sandbox.commit(&sandbox.work, "a.txt", "one\n");
    git(&sandbox.work, &["branch", "topic"]);
    let head = sandbox.commit(&sandbox.work, "b.txt", "two\n");
    let service = MergeService::new(Arc::new(GitCliGateway::default()));

    let outcome = service
        .merge(&squash_into_main(&sandbox, "refs/heads/topic"))
        .await
        .expect("empty squash is not an error");

    assert_eq!(outcome.head, head);
    assert_eq!(git(&sandbox.work, &["status", "--porcelain"]), "");
    assert_eq!(git(&sandbox.work, &["symbolic-ref", "--short", "HEAD"]), "main");
}
