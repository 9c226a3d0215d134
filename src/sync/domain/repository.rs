//! Registered repository records.

use super::{RemoteCredentials, RepositoryKey, SyncDomainError};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A repository registered with the sync service.
///
/// The local path is the working repository used for fetches, ancestry
/// checks and pushes. The registered URL is used whenever a remote named by
/// a task is not configured in the working repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    key: RepositoryKey,
    path: PathBuf,
    registered_url: Option<String>,
    credentials: RemoteCredentials,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted repository record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRepositoryData {
    /// Persisted key.
    pub key: RepositoryKey,
    /// Persisted working repository path.
    pub path: PathBuf,
    /// Persisted registered remote URL.
    pub registered_url: Option<String>,
    /// Persisted credential set.
    pub credentials: RemoteCredentials,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RepositoryRecord {
    /// Creates a validated repository record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::EmptyRepositoryPath`] for an empty path and
    /// [`SyncDomainError::InvalidCredential`] for malformed credentials.
    pub fn new(
        key: RepositoryKey,
        path: impl Into<PathBuf>,
        registered_url: Option<String>,
        credentials: RemoteCredentials,
        clock: &impl Clock,
    ) -> Result<Self, SyncDomainError> {
        let repository_path = path.into();
        if repository_path.as_os_str().is_empty() {
            return Err(SyncDomainError::EmptyRepositoryPath);
        }
        credentials.validate()?;
        let timestamp = clock.utc();
        Ok(Self {
            key,
            path: repository_path,
            registered_url: normalize_url(registered_url),
            credentials,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a record from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedRepositoryData) -> Self {
        Self {
            key: data.key,
            path: data.path,
            registered_url: data.registered_url,
            credentials: data.credentials,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the repository key.
    #[must_use]
    pub const fn key(&self) -> &RepositoryKey {
        &self.key
    }

    /// Returns the working repository path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the registered fallback remote URL.
    #[must_use]
    pub fn registered_url(&self) -> Option<&str> {
        self.registered_url.as_deref()
    }

    /// Returns the credential set.
    #[must_use]
    pub const fn credentials(&self) -> &RemoteCredentials {
        &self.credentials
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replaces the registered URL.
    pub fn set_registered_url(&mut self, url: Option<String>, clock: &impl Clock) {
        self.registered_url = normalize_url(url);
        self.updated_at = clock.utc();
    }

    /// Replaces the credential set after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidCredential`] for malformed
    /// credentials; the record is left unchanged.
    pub fn set_credentials(
        &mut self,
        credentials: RemoteCredentials,
        clock: &impl Clock,
    ) -> Result<(), SyncDomainError> {
        credentials.validate()?;
        self.credentials = credentials;
        self.updated_at = clock.utc();
        Ok(())
    }
}

fn normalize_url(url: Option<String>) -> Option<String> {
    url.map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
