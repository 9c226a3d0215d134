//! Results of the read-only merge dry run.

use super::CommitHash;
use serde::{Deserialize, Serialize};

/// Outcome of predicting whether two refs merge cleanly.
///
/// The prediction is file-level: any path changed on both sides relative to
/// the merge base is reported, even if the edits would merge textually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCheckReport {
    merge_base: CommitHash,
    conflicts: Vec<String>,
}

impl MergeCheckReport {
    /// Creates a report, sorting and de-duplicating the conflicting paths.
    #[must_use]
    pub fn new(merge_base: CommitHash, conflicts: impl IntoIterator<Item = String>) -> Self {
        let mut paths: Vec<String> = conflicts.into_iter().collect();
        paths.sort();
        paths.dedup();
        Self {
            merge_base,
            conflicts: paths,
        }
    }

    /// Returns `true` when no path was touched on both sides.
    #[must_use]
    pub fn success(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Returns the merge base the prediction was computed against.
    #[must_use]
    pub const fn merge_base(&self) -> &CommitHash {
        &self.merge_base
    }

    /// Returns the potentially conflicting paths, sorted.
    #[must_use]
    pub fn conflicts(&self) -> &[String] {
        &self.conflicts
    }
}
