//! Credential specifications attached to repository records.

use super::{RemoteName, SyncDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Secret string whose formatting output is always redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exposes the secret for handing to a transport.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// How to authenticate against a remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialSpec {
    /// HTTP(S) username and token.
    Token {
        /// Account name sent with the token.
        username: String,
        /// Access token or password.
        token: Secret,
    },
    /// SSH private key on the local filesystem.
    SshKey {
        /// Absolute path to the private key.
        private_key_path: PathBuf,
    },
}

impl CredentialSpec {
    /// Validates the specification.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidCredential`] for empty token fields
    /// or a relative SSH key path. `scope` names the slot in the error.
    pub fn validate(&self, scope: &str) -> Result<(), SyncDomainError> {
        let reason = match self {
            Self::Token { username, .. } if username.trim().is_empty() => {
                Some("username must not be empty")
            }
            Self::Token { token, .. } if token.expose().trim().is_empty() => {
                Some("token must not be empty")
            }
            Self::SshKey { private_key_path } if !private_key_path.is_absolute() => {
                Some("ssh key path must be absolute")
            }
            Self::Token { .. } | Self::SshKey { .. } => None,
        };

        match reason {
            Some(message) => Err(SyncDomainError::InvalidCredential {
                scope: scope.to_owned(),
                reason: message.to_owned(),
            }),
            None => Ok(()),
        }
    }
}

/// Credentials of one repository: a default plus per-remote overrides.
///
/// Lookup order is remote-specific override, then the repository default,
/// then anonymous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<CredentialSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    overrides: BTreeMap<RemoteName, CredentialSpec>,
}

impl RemoteCredentials {
    /// Creates an empty (anonymous) credential set.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Sets the repository-wide default credential.
    #[must_use]
    pub fn with_default(mut self, spec: CredentialSpec) -> Self {
        self.default = Some(spec);
        self
    }

    /// Adds an override for one remote, replacing any previous override.
    #[must_use]
    pub fn with_override(mut self, remote: RemoteName, spec: CredentialSpec) -> Self {
        self.overrides.insert(remote, spec);
        self
    }

    /// Returns the repository-wide default credential.
    #[must_use]
    pub const fn default_credential(&self) -> Option<&CredentialSpec> {
        self.default.as_ref()
    }

    /// Returns all per-remote overrides.
    #[must_use]
    pub const fn overrides(&self) -> &BTreeMap<RemoteName, CredentialSpec> {
        &self.overrides
    }

    /// Resolves the credential for a remote using the fallback order.
    #[must_use]
    pub fn for_remote(&self, remote: &RemoteName) -> Option<&CredentialSpec> {
        self.overrides.get(remote).or(self.default.as_ref())
    }

    /// Validates every configured credential.
    ///
    /// # Errors
    ///
    /// Returns the first [`SyncDomainError::InvalidCredential`] found.
    pub fn validate(&self) -> Result<(), SyncDomainError> {
        if let Some(spec) = &self.default {
            spec.validate("default")?;
        }
        for (remote, spec) in &self.overrides {
            if remote.is_local() {
                return Err(SyncDomainError::InvalidCredential {
                    scope: remote.to_string(),
                    reason: "the local sentinel never needs credentials".to_owned(),
                });
            }
            spec.validate(&format!("remote {remote}"))?;
        }
        Ok(())
    }
}
