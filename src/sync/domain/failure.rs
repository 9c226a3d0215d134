//! Tagged failure kinds for sync executions.

use super::ParseFailureKindError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse classification of why a sync run did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncFailureKind {
    /// Fetching or resolving the source branch failed.
    FetchSourceFailed,
    /// Fetching the target branch failed for a reason other than absence.
    FetchTargetFailed,
    /// The ancestry comparison itself could not be performed.
    AncestryCheckFailed,
    /// The source is an ancestor of the target; pushing would regress it.
    SourceBehindTarget,
    /// Source and target histories diverged.
    Conflict,
    /// The push was rejected or could not be performed.
    PushFailed,
    /// The task references missing repositories or unusable credentials.
    InvalidConfiguration,
    /// The run never completed and was closed by the reconciliation sweep.
    Orphaned,
}

impl SyncFailureKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchSourceFailed => "fetch-source-failed",
            Self::FetchTargetFailed => "fetch-target-failed",
            Self::AncestryCheckFailed => "ancestry-check-failed",
            Self::SourceBehindTarget => "source-behind-target",
            Self::Conflict => "conflict",
            Self::PushFailed => "push-failed",
            Self::InvalidConfiguration => "invalid-configuration",
            Self::Orphaned => "orphaned",
        }
    }

    /// Returns `true` for environmental failures that are safe to retry
    /// unchanged.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::FetchSourceFailed
                | Self::FetchTargetFailed
                | Self::AncestryCheckFailed
                | Self::PushFailed
                | Self::Orphaned
        )
    }
}

impl fmt::Display for SyncFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SyncFailureKind {
    type Error = ParseFailureKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "fetch-source-failed" => Ok(Self::FetchSourceFailed),
            "fetch-target-failed" => Ok(Self::FetchTargetFailed),
            "ancestry-check-failed" => Ok(Self::AncestryCheckFailed),
            "source-behind-target" => Ok(Self::SourceBehindTarget),
            "conflict" => Ok(Self::Conflict),
            "push-failed" => Ok(Self::PushFailed),
            "invalid-configuration" => Ok(Self::InvalidConfiguration),
            "orphaned" => Ok(Self::Orphaned),
            _ => Err(ParseFailureKindError(value.to_owned())),
        }
    }
}

/// A failed sync execution: the kind plus the underlying error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SyncFailure {
    kind: SyncFailureKind,
    message: String,
}

impl SyncFailure {
    /// Creates a failure of the given kind.
    #[must_use]
    pub fn new(kind: SyncFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the failure kind.
    #[must_use]
    pub const fn kind(&self) -> SyncFailureKind {
        self.kind
    }

    /// Returns the underlying error text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
