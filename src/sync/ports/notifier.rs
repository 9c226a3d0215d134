//! Notification port for completed runs.

use crate::sync::domain::{RepositoryKey, RunStatus, SyncRunId, SyncTaskKey, TriggerSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Payload emitted once a run has reached its terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCompletedEvent {
    /// Task that ran.
    pub task_key: SyncTaskKey,
    /// Source repository of the task.
    pub repository_key: RepositoryKey,
    /// Run record identifier.
    pub run_id: SyncRunId,
    /// What started the run.
    pub trigger: TriggerSource,
    /// Terminal status.
    pub status: RunStatus,
    /// Reported commit range, empty when nothing moved.
    pub commit_range: String,
    /// Error text of an unsuccessful run.
    pub error: Option<String>,
}

/// Delivers run completion events to notification channels.
///
/// Delivery is best effort; the executor logs and ignores errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunNotifier: Send + Sync {
    /// Hands an event to the notification channels.
    async fn notify(&self, event: &RunCompletedEvent) -> Result<(), NotifyError>;
}

/// Errors returned by notifier implementations.
#[derive(Debug, Clone, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub Arc<dyn std::error::Error + Send + Sync>);

impl NotifyError {
    /// Wraps a delivery error.
    pub fn delivery(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}
