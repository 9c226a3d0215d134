//! Credential resolution port.

use crate::sync::domain::{RemoteName, RepositoryRecord, Secret};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Credential handed to one fetch or push call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCredential {
    /// HTTP basic authentication.
    Basic {
        /// Account name.
        username: String,
        /// Token or password.
        password: Secret,
    },
    /// SSH private key file.
    SshKey {
        /// Path to the private key.
        private_key_path: PathBuf,
    },
}

/// Resolves the credential to use for a repository remote.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Returns the credential for `remote` of `repository`, or `None` for
    /// anonymous and local transports.
    async fn resolve(
        &self,
        repository: &RepositoryRecord,
        remote: &RemoteName,
    ) -> Result<Option<TransportCredential>, CredentialError>;
}

/// Errors returned by credential resolvers.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// The configured credential cannot be used.
    #[error("credential for remote {remote} is unusable: {reason}")]
    Unusable {
        /// Remote the credential was resolved for.
        remote: RemoteName,
        /// Reason, never containing secret material.
        reason: String,
    },

    /// Backend failure while resolving.
    #[error("credential backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl CredentialError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
