//! Cron triggers and the worker pool that runs sync jobs.
//!
//! The [`Scheduler`] keeps one trigger per schedulable task and submits a
//! job to the [`WorkerPool`] at every fire time. Manual and webhook
//! triggers use the same pool. Cron jobs only run while holding the task's
//! execution lease; a firing that finds the lease taken is skipped.

mod pool;
mod service;

pub use pool::{PoolSettings, WorkerPool};
pub use service::{DEFAULT_LEASE_TTL, Scheduler, SchedulerSettings};

use crate::sync::{domain::SyncTaskKey, ports::SyncCatalogError};
use thiserror::Error;

/// Errors returned by the scheduler and the worker pool.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// The worker pool queue is at capacity.
    #[error("sync job queue is full")]
    QueueFull,
    /// The worker pool no longer accepts jobs.
    #[error("worker pool is shut down")]
    ShutDown,
    /// No tokio runtime was available to spawn onto.
    #[error("scheduler must be created inside a tokio runtime")]
    NoRuntime,
    /// No task is registered under the key.
    #[error("sync task not found: {0}")]
    TaskNotFound(SyncTaskKey),
    /// No task carries the presented webhook token.
    #[error("unknown webhook token")]
    UnknownWebhookToken,
    /// The task exists but is disabled.
    #[error("sync task {0} is disabled")]
    TaskDisabled(SyncTaskKey),
    /// The task catalog could not be read.
    #[error(transparent)]
    Catalog(#[from] SyncCatalogError),
}

#[cfg(test)]
mod tests;
