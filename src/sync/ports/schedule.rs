//! Hook through which task writes reach the scheduler.

use crate::sync::domain::{SyncTask, SyncTaskKey};

/// Receives task lifecycle notifications after they are persisted.
///
/// Called synchronously by the registration service; implementations must
/// not block.
pub trait ScheduleHook: Send + Sync {
    /// A task was created or updated.
    fn on_task_saved(&self, task: &SyncTask);

    /// A task was deleted.
    fn on_task_deleted(&self, key: &SyncTaskKey);
}

/// Hook for deployments that only run syncs on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduleHook;

impl ScheduleHook for NoopScheduleHook {
    fn on_task_saved(&self, _task: &SyncTask) {}

    fn on_task_deleted(&self, _key: &SyncTaskKey) {}
}
