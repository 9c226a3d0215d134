//! Git data-access port used by the sync engine and the merge services.

use crate::sync::domain::{BranchName, CommitHash, RemoteName};
use crate::sync::ports::TransportCredential;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Result type for git gateway operations.
pub type GitResult<T> = Result<T, GitError>;

/// Request to fetch a single branch into a tracking ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Remote URL or path to fetch from.
    pub url: String,
    /// Fully qualified ref on the remote, e.g. `refs/heads/main`.
    pub remote_ref: String,
    /// Local ref updated by the fetch, e.g. `refs/remotes/origin/main`.
    pub tracking_ref: String,
    /// Credential for this one transport call.
    pub credential: Option<TransportCredential>,
}

impl FetchRequest {
    /// Returns the forced ref-spec `+<remote_ref>:<tracking_ref>`.
    #[must_use]
    pub fn refspec(&self) -> String {
        format!("+{}:{}", self.remote_ref, self.tracking_ref)
    }
}

/// Result of a fetch that reached the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The tracking ref now mirrors the remote ref.
    Fetched,
    /// The remote has no such ref.
    MissingRemoteRef,
}

/// Request to push one commit to a remote ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Remote URL or path to push to.
    pub url: String,
    /// Commit to push.
    pub commit: CommitHash,
    /// Fully qualified destination ref, e.g. `refs/heads/main`.
    pub destination_ref: String,
    /// Raw flags forwarded verbatim.
    pub options: Vec<String>,
    /// Credential for this one transport call.
    pub credential: Option<TransportCredential>,
}

/// Result of a push accepted by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote ref moved.
    Pushed,
    /// The remote reported there was nothing to push.
    UpToDate,
}

/// How a path changed between two commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The path did not exist before.
    Added,
    /// The path exists on both sides with different content or mode.
    Modified,
    /// The path no longer exists.
    Deleted,
}

/// A file-level change between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangedPath {
    /// Repository-relative path.
    pub path: String,
    /// Kind of change.
    pub kind: ChangeKind,
}

impl ChangedPath {
    /// Creates a changed path entry.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Merge to perform on the currently checked-out branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCommand {
    /// Commit to merge in.
    pub source: CommitHash,
    /// Squash the source history into a single commit.
    pub squash: bool,
    /// Commit message of the merge (or squash) commit.
    pub message: String,
}

/// Read/write access to git repositories on the local filesystem.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitGateway: Send + Sync {
    /// Returns the fetch URL configured for `remote`, or `None` when the
    /// remote is not configured in the repository.
    async fn remote_url(&self, repo: &Path, remote: &RemoteName) -> GitResult<Option<String>>;

    /// Fetches one ref into a tracking ref.
    async fn fetch(&self, repo: &Path, request: &FetchRequest) -> GitResult<FetchOutcome>;

    /// Resolves a ref or revision to a commit, `None` when it does not exist.
    async fn resolve_ref(&self, repo: &Path, reference: &str) -> GitResult<Option<CommitHash>>;

    /// Returns `true` when `ancestor` is reachable from `descendant`.
    ///
    /// A commit counts as its own ancestor.
    async fn is_ancestor(
        &self,
        repo: &Path,
        ancestor: &CommitHash,
        descendant: &CommitHash,
    ) -> GitResult<bool>;

    /// Pushes a commit to a remote ref.
    async fn push(&self, repo: &Path, request: &PushRequest) -> GitResult<PushOutcome>;

    /// Points a local ref at a commit.
    async fn update_ref(&self, repo: &Path, reference: &str, commit: &CommitHash)
    -> GitResult<()>;

    /// Returns the best common ancestor, `None` for unrelated histories.
    async fn merge_base(
        &self,
        repo: &Path,
        left: &CommitHash,
        right: &CommitHash,
    ) -> GitResult<Option<CommitHash>>;

    /// Lists file-level changes from `from` to `to`, without rename detection.
    async fn changed_paths(
        &self,
        repo: &Path,
        from: &CommitHash,
        to: &CommitHash,
    ) -> GitResult<Vec<ChangedPath>>;

    /// Returns the checked-out branch, `None` for a detached head.
    async fn current_branch(&self, repo: &Path) -> GitResult<Option<BranchName>>;

    /// Checks out a local branch.
    async fn checkout(&self, repo: &Path, branch: &BranchName) -> GitResult<()>;

    /// Merges a commit into the checked-out branch, committing the result.
    async fn merge(&self, repo: &Path, command: &MergeCommand) -> GitResult<()>;

    /// Aborts an in-progress merge and restores the pre-merge state.
    async fn merge_abort(&self, repo: &Path) -> GitResult<()>;
}

/// Errors returned by git gateway implementations.
#[derive(Debug, Clone, Error)]
pub enum GitError {
    /// A git command exited unsuccessfully.
    #[error("`git {command}` failed: {stderr}")]
    CommandFailed {
        /// Subcommand and safe arguments.
        command: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// A git command did not finish within the configured timeout.
    #[error("`git {command}` timed out after {seconds}s")]
    Timeout {
        /// Subcommand that timed out.
        command: String,
        /// Timeout in seconds.
        seconds: u64,
    },

    /// Git produced output the gateway could not interpret.
    #[error("unexpected git output: {0}")]
    InvalidOutput(String),

    /// The repository or ref does not exist in the gateway.
    #[error("not found: {0}")]
    NotFound(String),

    /// Spawning or talking to the git process failed.
    #[error("git I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for GitError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
