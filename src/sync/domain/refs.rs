//! Git reference value objects: remotes, branches, hashes, and ranges.

use super::SyncDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a validated branch name.
const MAX_BRANCH_NAME_LENGTH: usize = 200;

/// Maximum length for a remote name.
const MAX_REMOTE_NAME_LENGTH: usize = 100;

/// Characters `git check-ref-format` rejects anywhere in a ref component.
const FORBIDDEN_REF_CHARS: [char; 8] = ['~', '^', ':', '?', '*', '[', '\\', ' '];

/// Name of a git remote, or the `local` sentinel.
///
/// The sentinel tells the sync engine to read the local branch directly
/// instead of fetching a remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteName(String);

impl RemoteName {
    /// Sentinel remote name meaning "the local repository itself".
    pub const LOCAL: &'static str = "local";

    /// Creates a validated remote name.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidRemoteName`] when the value is
    /// empty, starts with `-`, or contains whitespace or ref-forbidden
    /// characters.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        let is_valid = !normalized.is_empty()
            && normalized.len() <= MAX_REMOTE_NAME_LENGTH
            && !normalized.starts_with('-')
            && !normalized.contains("..")
            && !normalized
                .chars()
                .any(|ch| {
                    ch.is_whitespace() || ch.is_control() || FORBIDDEN_REF_CHARS.contains(&ch)
                });

        if !is_valid {
            return Err(SyncDomainError::InvalidRemoteName(raw));
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Returns the `local` sentinel remote.
    #[must_use]
    pub fn local() -> Self {
        Self(Self::LOCAL.to_owned())
    }

    /// Returns `true` when this is the `local` sentinel.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0 == Self::LOCAL
    }

    /// Returns the remote name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RemoteName {
    type Error = SyncDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RemoteName> for String {
    fn from(value: RemoteName) -> Self {
        value.0
    }
}

impl fmt::Display for RemoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated git branch name (the part after `refs/heads/`).
///
/// # Examples
///
///     use refsync::sync::domain::BranchName;
///
///     let name = BranchName::new("release/1.x").expect("valid");
///     assert_eq!(name.head_ref(), "refs/heads/release/1.x");
///     assert!(BranchName::new("bad..name").is_err());
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Creates a validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidBranchName`] when the value violates
    /// git's ref-name rules or the length limit.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into();
        let normalized = raw.trim();

        if Self::is_invalid_branch_name(normalized) {
            return Err(SyncDomainError::InvalidBranchName(raw));
        }
        Ok(Self(normalized.to_owned()))
    }

    fn is_invalid_branch_name(name: &str) -> bool {
        let is_empty = name.is_empty();
        let exceeds_length_limit = name.len() > MAX_BRANCH_NAME_LENGTH;
        let has_forbidden_char = name
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control() || FORBIDDEN_REF_CHARS.contains(&ch));
        let has_bad_sequence = name.contains("..") || name.contains("@{") || name.contains("//");
        let has_bad_edges = name.starts_with('-')
            || name.starts_with('/')
            || name.starts_with('.')
            || name.ends_with('/')
            || name.ends_with('.')
            || name.ends_with(".lock");

        is_empty || exceeds_length_limit || has_forbidden_char || has_bad_sequence || has_bad_edges
    }

    /// Returns the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the fully qualified `refs/heads/<name>` ref.
    #[must_use]
    pub fn head_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = SyncDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchName> for String {
    fn from(value: BranchName) -> Self {
        value.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Full commit object name (SHA-1 or SHA-256), lower-case hexadecimal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    /// Creates a validated commit hash.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidCommitHash`] unless the trimmed value
    /// is 40 or 64 hexadecimal characters.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();
        let is_valid = matches!(normalized.len(), 40 | 64)
            && normalized.chars().all(|ch| ch.is_ascii_hexdigit());

        if !is_valid {
            return Err(SyncDomainError::InvalidCommitHash(raw));
        }
        Ok(Self(normalized))
    }

    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the conventional seven-character abbreviation.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl TryFrom<String> for CommitHash {
    type Error = SyncDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CommitHash> for String {
    fn from(value: CommitHash) -> Self {
        value.0
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commit range reported by a sync run.
///
/// Rendered as `"<old>..<new>"` for a fast-forward, as the bare new hash
/// when the target branch was created, and as the empty string when the
/// target was already up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRange {
    /// Target already matched the source; nothing was pushed.
    UpToDate,
    /// Target branch was fast-forwarded from `from` to `to`.
    FastForward {
        /// Previous target head.
        from: CommitHash,
        /// New target head (the source head).
        to: CommitHash,
    },
    /// Target branch did not exist and was created at the given commit.
    NewBranch(CommitHash),
}

impl CommitRange {
    /// Returns `true` when nothing was pushed.
    #[must_use]
    pub const fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate)
    }

    /// Returns the commit the target ends up at, if anything moved.
    #[must_use]
    pub const fn head(&self) -> Option<&CommitHash> {
        match self {
            Self::UpToDate => None,
            Self::FastForward { to, .. } | Self::NewBranch(to) => Some(to),
        }
    }
}

impl fmt::Display for CommitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => Ok(()),
            Self::FastForward { from, to } => write!(f, "{from}..{to}"),
            Self::NewBranch(hash) => write!(f, "{hash}"),
        }
    }
}
