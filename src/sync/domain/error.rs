//! Error types for sync domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing or mutating sync domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncDomainError {
    /// The sync task key is empty, too long, or contains forbidden characters.
    #[error("invalid sync task key '{0}'")]
    InvalidTaskKey(String),

    /// The repository key is empty, too long, or contains whitespace.
    #[error("invalid repository key '{0}'")]
    InvalidRepositoryKey(String),

    /// The remote name is not a valid git remote name.
    #[error("invalid remote name '{0}'")]
    InvalidRemoteName(String),

    /// The branch name is not a valid git branch name.
    #[error("invalid branch name '{0}'")]
    InvalidBranchName(String),

    /// The value is not a full lower-case hexadecimal commit hash.
    #[error("invalid commit hash '{0}'")]
    InvalidCommitHash(String),

    /// The cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression {
        /// Expression as supplied.
        expression: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A push option is not a command-line flag.
    #[error("invalid push option '{0}', expected a flag starting with '-'")]
    InvalidPushOption(String),

    /// The target remote uses the `local` sentinel, which only applies to sources.
    #[error("target remote must name a real remote, not 'local'")]
    LocalTargetRemote,

    /// The webhook token is too short or contains whitespace.
    #[error("webhook token must be at least 16 characters without whitespace")]
    InvalidWebhookToken,

    /// The repository path is empty.
    #[error("repository path must not be empty")]
    EmptyRepositoryPath,

    /// A credential specification is malformed.
    #[error("invalid credential for {scope}: {reason}")]
    InvalidCredential {
        /// Which credential slot was rejected.
        scope: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A run received a second terminal status.
    #[error("sync run {0} is already completed")]
    RunAlreadyCompleted(String),
}

/// Error returned while parsing run statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown run status: {0}")]
pub struct ParseRunStatusError(pub String);

/// Error returned while parsing trigger sources from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown trigger source: {0}")]
pub struct ParseTriggerSourceError(pub String);

/// Error returned while parsing failure kinds from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown failure kind: {0}")]
pub struct ParseFailureKindError(pub String);
