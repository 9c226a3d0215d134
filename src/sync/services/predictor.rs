//! Read-only prediction of whether two refs merge cleanly.

use crate::sync::{
    domain::{CommitHash, MergeCheckReport},
    ports::{GitError, GitGateway},
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by [`ConflictPredictor::check`].
#[derive(Debug, Clone, Error)]
pub enum MergeCheckError {
    /// A ref does not resolve to a commit.
    #[error("unknown ref: {0}")]
    UnknownRef(String),
    /// The refs share no history.
    #[error("{source_ref} and {target_ref} have no common ancestor")]
    NoCommonAncestor {
        /// Source ref as given.
        source_ref: String,
        /// Target ref as given.
        target_ref: String,
    },
    /// Git access failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Reports paths changed on both sides since the merge base.
///
/// The check is deliberately conservative: edits to different hunks of the
/// same file still count as a conflict. Nothing in the repository is
/// modified.
pub struct ConflictPredictor<G>
where
    G: GitGateway,
{
    git: Arc<G>,
}

impl<G> ConflictPredictor<G>
where
    G: GitGateway,
{
    /// Creates a predictor.
    #[must_use]
    pub const fn new(git: Arc<G>) -> Self {
        Self { git }
    }

    /// Predicts the outcome of merging `source_ref` into `target_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`MergeCheckError::UnknownRef`] for unresolvable refs,
    /// [`MergeCheckError::NoCommonAncestor`] for unrelated histories, and
    /// [`MergeCheckError::Git`] when git access fails.
    pub async fn check(
        &self,
        repo: &Path,
        source_ref: &str,
        target_ref: &str,
    ) -> Result<MergeCheckReport, MergeCheckError> {
        let source = self.resolve(repo, source_ref).await?;
        let target = self.resolve(repo, target_ref).await?;
        let base = self
            .git
            .merge_base(repo, &source, &target)
            .await?
            .ok_or_else(|| MergeCheckError::NoCommonAncestor {
                source_ref: source_ref.to_owned(),
                target_ref: target_ref.to_owned(),
            })?;

        let source_changes: BTreeSet<String> = self
            .git
            .changed_paths(repo, &base, &source)
            .await?
            .into_iter()
            .map(|change| change.path)
            .collect();
        let conflicts: Vec<String> = self
            .git
            .changed_paths(repo, &base, &target)
            .await?
            .into_iter()
            .map(|change| change.path)
            .filter(|path| source_changes.contains(path))
            .collect();

        Ok(MergeCheckReport::new(base, conflicts))
    }

    async fn resolve(&self, repo: &Path, reference: &str) -> Result<CommitHash, MergeCheckError> {
        self.git
            .resolve_ref(repo, reference)
            .await?
            .ok_or_else(|| MergeCheckError::UnknownRef(reference.to_owned()))
    }
}
