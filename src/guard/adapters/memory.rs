//! In-process execution guard.

use crate::guard::{
    domain::{LeaseHolder, LeaseKey},
    ports::{ExecutionGuard, GuardError, GuardResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Lease {
    holder: LeaseHolder,
    expires_at: Instant,
}

type LeaseTable = HashMap<LeaseKey, Lease>;

/// Guard backed by a process-local lease table.
///
/// Every handle has its own holder marker; [`Self::handle`] creates another
/// holder over the same table.
#[derive(Debug, Clone)]
pub struct InMemoryExecutionGuard {
    holder: LeaseHolder,
    leases: Arc<Mutex<LeaseTable>>,
}

impl Default for InMemoryExecutionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExecutionGuard {
    /// Creates a guard with an empty lease table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            holder: LeaseHolder::new(),
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns another holder sharing this guard's lease table.
    #[must_use]
    pub fn handle(&self) -> Self {
        Self {
            holder: LeaseHolder::new(),
            leases: Arc::clone(&self.leases),
        }
    }

    /// Returns this handle's holder marker.
    #[must_use]
    pub const fn holder(&self) -> LeaseHolder {
        self.holder
    }

    /// Returns the number of leases in the table, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Backend`] when the table lock is poisoned.
    pub fn lease_count(&self) -> GuardResult<usize> {
        Ok(self.table()?.len())
    }

    /// Drops expired leases and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Backend`] when the table lock is poisoned.
    pub fn sweep_expired(&self) -> GuardResult<usize> {
        let now = Instant::now();
        let mut leases = self.table()?;
        let before = leases.len();
        leases.retain(|_, lease| lease.expires_at > now);
        Ok(before.saturating_sub(leases.len()))
    }

    /// Sweeps expired leases every `interval` until the returned task is
    /// aborted.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let guard = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match guard.sweep_expired() {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "swept expired leases"),
                    Err(err) => debug!(error = %err, "lease sweep failed"),
                }
            }
        })
    }

    fn table(&self) -> GuardResult<MutexGuard<'_, LeaseTable>> {
        self.leases
            .lock()
            .map_err(|err| GuardError::backend(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl ExecutionGuard for InMemoryExecutionGuard {
    async fn acquire(&self, key: &LeaseKey, ttl: Duration) -> GuardResult<bool> {
        if ttl.is_zero() {
            return Err(GuardError::InvalidTtl(ttl));
        }
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).ok_or(GuardError::InvalidTtl(ttl))?;
        let mut leases = self.table()?;
        if leases.get(key).is_some_and(|lease| lease.expires_at > now) {
            return Ok(false);
        }
        leases.insert(
            key.clone(),
            Lease {
                holder: self.holder,
                expires_at,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &LeaseKey) -> GuardResult<()> {
        let mut leases = self.table()?;
        if leases.get(key).is_some_and(|lease| lease.holder == self.holder) {
            leases.remove(key);
        }
        Ok(())
    }
}
