//! Trigger table and job submission.

use super::{SchedulerError, WorkerPool};
use crate::guard::{domain::LeaseKey, ports::ExecutionGuard};
use crate::sync::{
    domain::{SyncTask, SyncTaskKey, TriggerSource},
    ports::{ScheduleHook, SyncCatalog},
    services::SyncRunner,
};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default lifetime of a cron execution lease.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(600);

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Safety ceiling of the lease held while a cron job runs.
    pub lease_ttl: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

/// Live trigger of one task; dropping it stops the trigger.
struct Trigger {
    cron: String,
    task: JoinHandle<()>,
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Everything a cron firing needs, shared by all triggers.
struct Dispatch<R, G, K> {
    runner: Arc<R>,
    guard: Arc<G>,
    pool: Arc<WorkerPool>,
    clock: Arc<K>,
    lease_ttl: Duration,
}

impl<R, G, K> Clone for Dispatch<R, G, K> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            guard: Arc::clone(&self.guard),
            pool: Arc::clone(&self.pool),
            clock: Arc::clone(&self.clock),
            lease_ttl: self.lease_ttl,
        }
    }
}

impl<R, G, K> Dispatch<R, G, K>
where
    R: SyncRunner,
    G: ExecutionGuard + 'static,
    K: Clock + Send + Sync + 'static,
{
    async fn fire_forever(self, key: SyncTaskKey, schedule: cron::Schedule) {
        loop {
            let now = self.clock.utc();
            let Some(next) = schedule.after(&now).next() else {
                info!(task = %key, "cron schedule has no further fire times");
                return;
            };
            let delay = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
            debug!(task = %key, "cron trigger fired");
            let job = self.clone().run_cron_job(key.clone());
            if let Err(err) = self.pool.submit(job) {
                warn!(task = %key, error = %err, "dropping cron firing");
            }
        }
    }

    async fn run_cron_job(self, key: SyncTaskKey) {
        let lease = LeaseKey::for_task(&key);
        match self.guard.acquire(&lease, self.lease_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                info!(task = %key, lease = %lease, "lease unavailable; skipping cron run");
                return;
            }
            Err(err) => {
                warn!(task = %key, error = %err, "execution guard failed; skipping cron run");
                return;
            }
        }
        // The run gets its own task so a panic surfaces here and the lease is still released.
        let runner = Arc::clone(&self.runner);
        let run_key = key.clone();
        let run = tokio::spawn(async move {
            run_and_log(runner.as_ref(), &run_key, TriggerSource::Cron).await;
        });
        if let Err(err) = run.await {
            warn!(task = %key, error = %err, "cron run aborted");
        }
        if let Err(err) = self.guard.release(&lease).await {
            warn!(task = %key, lease = %lease, error = %err, "could not release lease");
        }
    }
}

async fn run_and_log<R: SyncRunner>(runner: &R, key: &SyncTaskKey, trigger: TriggerSource) {
    match runner.run(key, trigger).await {
        Ok(run) => info!(
            task = %key,
            run = %run.id(),
            trigger = %trigger,
            commit_range = run.commit_range(),
            "sync run succeeded"
        ),
        Err(err) => warn!(
            task = %key,
            trigger = %trigger,
            error = %err,
            "sync run did not succeed"
        ),
    }
}

/// Keeps cron triggers in step with the task catalog and queues runs.
///
/// Created once per process and shared by handle. The trigger table sits
/// behind one coarse lock that is never held across an await point.
pub struct Scheduler<R, G, C, K>
where
    R: SyncRunner,
    G: ExecutionGuard + 'static,
    C: SyncCatalog,
    K: Clock + Send + Sync + 'static,
{
    dispatch: Dispatch<R, G, K>,
    catalog: Arc<C>,
    runtime: Handle,
    triggers: Mutex<HashMap<SyncTaskKey, Trigger>>,
}

impl<R, G, C, K> Scheduler<R, G, C, K>
where
    R: SyncRunner,
    G: ExecutionGuard + 'static,
    C: SyncCatalog,
    K: Clock + Send + Sync + 'static,
{
    /// Creates a scheduler bound to the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] outside a tokio runtime.
    pub fn new(
        runner: Arc<R>,
        guard: Arc<G>,
        catalog: Arc<C>,
        pool: Arc<WorkerPool>,
        clock: Arc<K>,
        settings: SchedulerSettings,
    ) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self {
            dispatch: Dispatch {
                runner,
                guard,
                pool,
                clock,
                lease_ttl: settings.lease_ttl,
            },
            catalog,
            runtime,
            triggers: Mutex::new(HashMap::new()),
        })
    }

    /// Replaces the trigger of a created or updated task.
    ///
    /// The old trigger is removed first; a new one is added only when the
    /// task is enabled and has a cron expression.
    pub fn on_task_saved(&self, task: &SyncTask) {
        self.replace_trigger(task);
    }

    /// Removes the trigger of a deleted task.
    pub fn on_task_deleted(&self, key: &SyncTaskKey) {
        self.remove_trigger(key);
    }

    /// Rebuilds the trigger table from `tasks` and returns how many
    /// triggers are active.
    #[must_use]
    pub fn reload(&self, tasks: &[SyncTask]) -> usize {
        let mut triggers = self.lock_triggers();
        triggers.clear();
        for task in tasks {
            if let Some(trigger) = self.trigger_for(task) {
                triggers.insert(task.key().clone(), trigger);
            }
        }
        info!(scheduled = triggers.len(), "cron triggers reloaded");
        triggers.len()
    }

    /// Rebuilds the trigger table from the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Catalog`] when the tasks cannot be listed;
    /// the existing triggers are kept in that case.
    pub async fn reload_from_catalog(&self) -> Result<usize, SchedulerError> {
        let tasks = self.catalog.list_tasks().await?;
        let scheduled = self.reload(&tasks);
        Ok(scheduled)
    }

    /// Returns the keys of scheduled tasks, sorted.
    #[must_use]
    pub fn scheduled_keys(&self) -> Vec<SyncTaskKey> {
        let mut keys: Vec<SyncTaskKey> = self.lock_triggers().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the normalised cron expression a task is scheduled with.
    #[must_use]
    pub fn scheduled_cron(&self, key: &SyncTaskKey) -> Option<String> {
        self.lock_triggers()
            .get(key)
            .map(|trigger| trigger.cron.clone())
    }

    /// Queues a manual run of a task.
    ///
    /// The call returns once the run is queued, not when it finishes.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TaskNotFound`] for unknown keys,
    /// [`SchedulerError::QueueFull`] when the pool is saturated and
    /// [`SchedulerError::Catalog`] when the lookup fails.
    pub async fn trigger_manual(&self, key: &SyncTaskKey) -> Result<(), SchedulerError> {
        self.catalog
            .find_task(key)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound(key.clone()))?;
        self.submit_untracked(key.clone(), TriggerSource::Manual)?;
        info!(task = %key, "manual run queued");
        Ok(())
    }

    /// Queues a run of the task owning `token` and returns its key.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownWebhookToken`] when no task owns
    /// the token, [`SchedulerError::TaskDisabled`] for disabled tasks,
    /// [`SchedulerError::QueueFull`] when the pool is saturated and
    /// [`SchedulerError::Catalog`] when the lookup fails.
    pub async fn trigger_webhook(&self, token: &str) -> Result<SyncTaskKey, SchedulerError> {
        let task = self
            .catalog
            .find_task_by_webhook_token(token)
            .await?
            .ok_or(SchedulerError::UnknownWebhookToken)?;
        if !task.enabled() {
            return Err(SchedulerError::TaskDisabled(task.key().clone()));
        }
        let key = task.key().clone();
        self.submit_untracked(key.clone(), TriggerSource::Webhook)?;
        info!(task = %key, "webhook run queued");
        Ok(key)
    }

    /// Stops every trigger and drains the worker pool.
    pub async fn shutdown(&self) {
        self.lock_triggers().clear();
        self.dispatch.pool.shutdown().await;
    }

    fn submit_untracked(
        &self,
        key: SyncTaskKey,
        trigger: TriggerSource,
    ) -> Result<(), SchedulerError> {
        let runner = Arc::clone(&self.dispatch.runner);
        self.dispatch
            .pool
            .submit(async move { run_and_log(runner.as_ref(), &key, trigger).await })
    }

    fn replace_trigger(&self, task: &SyncTask) {
        let mut triggers = self.lock_triggers();
        triggers.remove(task.key());
        if let Some(trigger) = self.trigger_for(task) {
            triggers.insert(task.key().clone(), trigger);
        }
    }

    fn remove_trigger(&self, key: &SyncTaskKey) {
        if self.lock_triggers().remove(key).is_some() {
            info!(task = %key, "cron trigger removed");
        }
    }

    fn trigger_for(&self, task: &SyncTask) -> Option<Trigger> {
        if !task.is_schedulable() {
            return None;
        }
        let cron = task.cron()?;
        let schedule = match cron.schedule() {
            Ok(schedule) => schedule,
            Err(err) => {
                warn!(task = %task.key(), error = %err, "not scheduling task");
                return None;
            }
        };
        let handle = self
            .runtime
            .spawn(self.dispatch.clone().fire_forever(task.key().clone(), schedule));
        info!(task = %task.key(), cron = cron.normalized(), "cron trigger added");
        Some(Trigger {
            cron: cron.normalized().to_owned(),
            task: handle,
        })
    }

    fn lock_triggers(&self) -> MutexGuard<'_, HashMap<SyncTaskKey, Trigger>> {
        self.triggers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R, G, C, K> ScheduleHook for Scheduler<R, G, C, K>
where
    R: SyncRunner,
    G: ExecutionGuard + 'static,
    C: SyncCatalog,
    K: Clock + Send + Sync + 'static,
{
    fn on_task_saved(&self, task: &SyncTask) {
        self.replace_trigger(task);
    }

    fn on_task_deleted(&self, key: &SyncTaskKey) {
        self.remove_trigger(key);
    }
}
