//! Execution guard port.

use super::domain::LeaseKey;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// How often [`ExecutionGuard::acquire_wait`] retries.
pub const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result type for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;

/// Lease-based mutual exclusion across one or more running instances.
///
/// At most one `acquire` succeeds per key until the lease is released by
/// its holder or its TTL elapses.
#[async_trait]
pub trait ExecutionGuard: Send + Sync {
    /// Tries to take the lease without waiting.
    ///
    /// Returns `false` when another unexpired lease exists.
    async fn acquire(&self, key: &LeaseKey, ttl: Duration) -> GuardResult<bool>;

    /// Gives the lease back.
    ///
    /// Releasing a lease this handle does not hold is a no-op.
    async fn release(&self, key: &LeaseKey) -> GuardResult<()>;

    /// Polls [`Self::acquire`] until it succeeds or `wait_timeout` elapses.
    async fn acquire_wait(
        &self,
        key: &LeaseKey,
        ttl: Duration,
        wait_timeout: Duration,
    ) -> GuardResult<()> {
        let started = Instant::now();
        loop {
            if self.acquire(key, ttl).await? {
                return Ok(());
            }
            let waited = started.elapsed();
            let Some(remaining) = wait_timeout.checked_sub(waited).filter(|left| !left.is_zero())
            else {
                return Err(GuardError::Timeout {
                    key: key.clone(),
                    waited: wait_timeout,
                });
            };
            tokio::time::sleep(remaining.min(ACQUIRE_POLL_INTERVAL)).await;
        }
    }
}

/// Errors returned by guard implementations.
#[derive(Debug, Clone, Error)]
pub enum GuardError {
    /// `acquire_wait` gave up.
    #[error("timed out after {waited:?} waiting for lease {key}")]
    Timeout {
        /// Lease that stayed taken.
        key: LeaseKey,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The TTL cannot be represented by the backend.
    #[error("lease ttl {0:?} is out of range")]
    InvalidTtl(Duration),

    /// Backend failure.
    #[error("execution guard backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl GuardError {
    /// Wraps a backend failure.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
