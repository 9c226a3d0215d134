//! Identifier types for sync tasks, repositories, and runs.

use super::SyncDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length for task and repository keys.
const MAX_KEY_LENGTH: usize = 100;

/// Unique, immutable key of a sync task.
///
/// Keys are restricted to ASCII alphanumerics, `.`, `_` and `-` so they can
/// be embedded in lease keys and log lines without quoting.
///
/// # Examples
///
///     use refsync::sync::domain::SyncTaskKey;
///
///     let key = SyncTaskKey::new("mirror-main").expect("valid key");
///     assert_eq!(key.as_str(), "mirror-main");
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncTaskKey(String);

impl SyncTaskKey {
    /// Creates a validated task key.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidTaskKey`] when the trimmed value is
    /// empty, longer than 100 characters, or contains characters outside
    /// `[A-Za-z0-9._-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        let is_valid = !normalized.is_empty()
            && normalized.len() <= MAX_KEY_LENGTH
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'));

        if !is_valid {
            return Err(SyncDomainError::InvalidTaskKey(raw));
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SyncTaskKey {
    type Error = SyncDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SyncTaskKey> for String {
    fn from(value: SyncTaskKey) -> Self {
        value.0
    }
}

impl AsRef<str> for SyncTaskKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for SyncTaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a registered repository record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryKey(String);

impl RepositoryKey {
    /// Creates a validated repository key.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidRepositoryKey`] when the trimmed
    /// value is empty, too long, or contains whitespace or `/`.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        let is_valid = !normalized.is_empty()
            && normalized.len() <= MAX_KEY_LENGTH
            && !normalized
                .chars()
                .any(|ch| ch.is_whitespace() || ch == '/');

        if !is_valid {
            return Err(SyncDomainError::InvalidRepositoryKey(raw));
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepositoryKey {
    type Error = SyncDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepositoryKey> for String {
    fn from(value: RepositoryKey) -> Self {
        value.0
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a sync run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    /// Creates a new random run identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a run identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
