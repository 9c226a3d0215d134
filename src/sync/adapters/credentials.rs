//! Credential resolution from the per-remote sets stored on repository
//! records.

use async_trait::async_trait;

use crate::sync::{
    domain::{CredentialSpec, RemoteName, RepositoryRecord},
    ports::{CredentialError, CredentialResolver, TransportCredential},
};

/// Resolves credentials from the repository record itself.
///
/// The lookup order is the remote-specific override, then the repository
/// default, then anonymous access. The `local` pseudo-remote never carries a
/// credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCredentialResolver;

impl RecordCredentialResolver {
    /// Creates a resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialResolver for RecordCredentialResolver {
    async fn resolve(
        &self,
        repository: &RepositoryRecord,
        remote: &RemoteName,
    ) -> Result<Option<TransportCredential>, CredentialError> {
        if remote.is_local() {
            return Ok(None);
        }
        let Some(spec) = repository.credentials().for_remote(remote) else {
            return Ok(None);
        };
        spec.validate(remote.as_str())
            .map_err(|err| CredentialError::Unusable {
                remote: remote.clone(),
                reason: err.to_string(),
            })?;
        Ok(Some(match spec {
            CredentialSpec::Token { username, token } => TransportCredential::Basic {
                username: username.clone(),
                password: token.clone(),
            },
            CredentialSpec::SshKey { private_key_path } => TransportCredential::SshKey {
                private_key_path: private_key_path.clone(),
            },
        }))
    }
}
