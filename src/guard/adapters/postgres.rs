//! `PostgreSQL` execution guard shared by every instance using the database.

use crate::guard::{
    domain::{LeaseHolder, LeaseKey},
    ports::{ExecutionGuard, GuardError, GuardResult},
};
use crate::sync::adapters::postgres::SyncPgPool;
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

diesel::table! {
    /// Active execution leases.
    execution_leases (lease_key) {
        /// Guarded resource.
        lease_key -> Varchar,
        /// Holder marker of the owning guard handle.
        holder -> Uuid,
        /// Database time after which the lease may be taken over.
        expires_at -> Timestamptz,
    }
}

/// Takes the lease when it is free or expired; returns no row otherwise.
const ACQUIRE_SQL: &str = concat!(
    "INSERT INTO execution_leases (lease_key, holder, expires_at) ",
    "VALUES ($1, $2, now() + $3 * interval '1 millisecond') ",
    "ON CONFLICT (lease_key) DO UPDATE ",
    "SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at ",
    "WHERE execution_leases.expires_at <= now() ",
    "RETURNING holder",
);

#[derive(Debug, QueryableByName)]
struct AcquiredLease {
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    holder: uuid::Uuid,
}

/// Guard backed by the `execution_leases` table.
///
/// Expiry is judged against database time, so instance clocks may drift.
#[derive(Debug, Clone)]
pub struct PostgresExecutionGuard {
    pool: SyncPgPool,
    holder: LeaseHolder,
}

impl PostgresExecutionGuard {
    /// Creates a guard handle with a fresh holder marker.
    #[must_use]
    pub fn new(pool: SyncPgPool) -> Self {
        Self {
            pool,
            holder: LeaseHolder::new(),
        }
    }

    /// Returns this handle's holder marker.
    #[must_use]
    pub const fn holder(&self) -> LeaseHolder {
        self.holder
    }

    /// Deletes leases that expired before now and returns how many.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Backend`] when the database call fails.
    pub async fn sweep_expired(&self) -> GuardResult<usize> {
        self.run_blocking(|connection| {
            diesel::delete(
                execution_leases::table
                    .filter(execution_leases::expires_at.le(diesel::dsl::now)),
            )
            .execute(connection)
            .map_err(GuardError::backend)
        })
        .await
    }

    /// Spawns a task that calls [`Self::sweep_expired`] every `interval`.
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
                match guard.sweep_expired().await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "swept expired leases"),
                    Err(err) => warn!(error = %err, "lease sweep failed"),
                }
            }
        })
    }

    async fn run_blocking<F, T>(&self, f: F) -> GuardResult<T>
    where
        F: FnOnce(&mut PgConnection) -> GuardResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(GuardError::backend)?;
            f(&mut connection)
        })
        .await
        .map_err(GuardError::backend)?
    }
}

#[async_trait]
impl ExecutionGuard for PostgresExecutionGuard {
    async fn acquire(&self, key: &LeaseKey, ttl: Duration) -> GuardResult<bool> {
        let ttl_millis = ttl_millis(ttl)?;
        let lease_key = key.as_str().to_owned();
        let holder = self.holder.into_inner();
        self.run_blocking(move |connection| {
            diesel::sql_query(ACQUIRE_SQL)
                .bind::<diesel::sql_types::Varchar, _>(lease_key)
                .bind::<diesel::sql_types::Uuid, _>(holder)
                .bind::<diesel::sql_types::BigInt, _>(ttl_millis)
                .get_result::<AcquiredLease>(connection)
                .optional()
                .map(|row| row.is_some_and(|lease| lease.holder == holder))
                .map_err(GuardError::backend)
        })
        .await
    }

    async fn release(&self, key: &LeaseKey) -> GuardResult<()> {
        let lease_key = key.as_str().to_owned();
        let holder = self.holder.into_inner();
        self.run_blocking(move |connection| {
            diesel::delete(
                execution_leases::table
                    .filter(execution_leases::lease_key.eq(lease_key))
                    .filter(execution_leases::holder.eq(holder)),
            )
            .execute(connection)
            .map_err(GuardError::backend)?;
            Ok(())
        })
        .await
    }
}

fn ttl_millis(ttl: Duration) -> GuardResult<i64> {
    if ttl.is_zero() {
        return Err(GuardError::InvalidTtl(ttl));
    }
    i64::try_from(ttl.as_millis()).map_err(|_| GuardError::InvalidTtl(ttl))
}
