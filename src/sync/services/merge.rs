//! Interactive merges guarded by the conflict predictor.

use super::predictor::{ConflictPredictor, MergeCheckError};
use crate::sync::{
    domain::{BranchName, CommitHash},
    ports::{GitError, GitGateway, MergeCommand},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Merge of a source ref into a local branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    /// Repository to merge in.
    pub repo_path: PathBuf,
    /// Ref or revision to merge.
    pub source_ref: String,
    /// Local branch receiving the merge.
    pub target_branch: BranchName,
    /// Collapse the source history into a single commit.
    pub squash: bool,
    /// Message of the resulting commit.
    pub message: String,
}

/// Result of a completed merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// New head of the target branch.
    pub head: CommitHash,
    /// Merge base the prediction was computed against.
    pub merge_base: CommitHash,
}

/// Errors returned by [`MergeService::merge`].
#[derive(Debug, Clone, Error)]
pub enum MergeError {
    /// The dry run could not be performed.
    #[error(transparent)]
    Check(#[from] MergeCheckError),
    /// The dry run predicted conflicts; the repository was not touched.
    #[error("merge would conflict in {}", .0.join(", "))]
    Conflicts(Vec<String>),
    /// Git refused the merge; the merge was aborted.
    #[error("merge failed: {0}")]
    MergeFailed(GitError),
    /// Checking out or inspecting branches failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Performs merges after a clean conflict prediction.
pub struct MergeService<G>
where
    G: GitGateway,
{
    git: Arc<G>,
    predictor: ConflictPredictor<G>,
}

impl<G> MergeService<G>
where
    G: GitGateway,
{
    /// Creates a merge service.
    #[must_use]
    pub fn new(git: Arc<G>) -> Self {
        Self {
            predictor: ConflictPredictor::new(Arc::clone(&git)),
            git,
        }
    }

    /// Merges `request.source_ref` into `request.target_branch`.
    ///
    /// The originally checked-out branch is restored afterwards, also when
    /// the merge fails. A detached head stays on the target branch.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::Conflicts`] without touching the repository
    /// when conflicts are predicted, [`MergeError::MergeFailed`] when git
    /// rejects the merge, and [`MergeError::Git`] for other git failures.
    pub async fn merge(&self, request: &MergeRequest) -> Result<MergeOutcome, MergeError> {
        let repo = request.repo_path.as_path();
        let target_ref = request.target_branch.head_ref();
        let report = self
            .predictor
            .check(repo, &request.source_ref, &target_ref)
            .await?;
        if !report.success() {
            return Err(MergeError::Conflicts(report.conflicts().to_vec()));
        }

        let source = self
            .git
            .resolve_ref(repo, &request.source_ref)
            .await?
            .ok_or_else(|| MergeCheckError::UnknownRef(request.source_ref.clone()))?;
        let original = self.git.current_branch(repo).await?;
        self.git.checkout(repo, &request.target_branch).await?;

        let command = MergeCommand {
            source,
            squash: request.squash,
            message: request.message.clone(),
        };
        if let Err(err) = self.git.merge(repo, &command).await {
            warn!(repo = %repo.display(), error = %err, "merge failed; aborting");
            if let Err(abort_err) = self.git.merge_abort(repo).await {
                warn!(repo = %repo.display(), error = %abort_err, "merge abort failed");
            }
            self.restore(repo, original.as_ref()).await;
            return Err(MergeError::MergeFailed(err));
        }

        let head = self
            .git
            .resolve_ref(repo, &target_ref)
            .await?
            .ok_or_else(|| GitError::NotFound(target_ref.clone()))?;
        self.restore(repo, original.as_ref()).await;
        info!(
            repo = %repo.display(),
            branch = %request.target_branch,
            head = %head,
            squash = request.squash,
            "merge completed"
        );
        Ok(MergeOutcome {
            head,
            merge_base: report.merge_base().clone(),
        })
    }

    async fn restore(&self, repo: &Path, original: Option<&BranchName>) {
        let Some(branch) = original else {
            return;
        };
        if let Err(err) = self.git.checkout(repo, branch).await {
            warn!(
                repo = %repo.display(),
                branch = %branch,
                error = %err,
                "could not restore branch"
            );
        }
    }
}
