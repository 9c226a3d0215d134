//! Notifier that reports run completions as tracing events.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::sync::{
    domain::RunStatus,
    ports::{NotifyError, RunCompletedEvent, RunNotifier},
};

/// Emits one structured tracing event per completed run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRunNotifier;

impl TracingRunNotifier {
    /// Creates a notifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RunNotifier for TracingRunNotifier {
    async fn notify(&self, event: &RunCompletedEvent) -> Result<(), NotifyError> {
        if event.status == RunStatus::Success {
            info!(
                task = %event.task_key,
                repository = %event.repository_key,
                run = %event.run_id,
                trigger = %event.trigger,
                commit_range = %event.commit_range,
                "sync run succeeded"
            );
        } else {
            warn!(
                task = %event.task_key,
                repository = %event.repository_key,
                run = %event.run_id,
                trigger = %event.trigger,
                status = %event.status,
                error = event.error.as_deref().unwrap_or_default(),
                "sync run did not succeed"
            );
        }
        Ok(())
    }
}
