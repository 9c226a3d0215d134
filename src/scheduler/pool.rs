//! Bounded worker pool for sync jobs.

use super::SchedulerError;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Sizing of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Jobs running at the same time.
    pub concurrency: usize,
    /// Jobs waiting for a worker before submissions are refused.
    pub queue_capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queue_capacity: 64,
        }
    }
}

/// Runs submitted jobs with bounded concurrency behind a bounded queue.
///
/// Submitting never waits: a full queue is reported to the caller.
#[derive(Debug)]
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts the dispatcher on the current tokio runtime.
    ///
    /// Zero sizes are raised to one.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] outside a tokio runtime.
    pub fn start(settings: PoolSettings) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        let dispatcher = runtime.spawn(dispatch(receiver, permits));
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Queues a job.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueFull`] when the queue is at capacity
    /// and [`SchedulerError::ShutDown`] after [`Self::shutdown`].
    pub fn submit(
        &self,
        job: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), SchedulerError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SchedulerError::ShutDown)?;
        sender.try_send(Box::pin(job)).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SchedulerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SchedulerError::ShutDown,
        })
    }

    /// Stops accepting jobs and waits for queued and running jobs to finish.
    pub async fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = dispatcher else {
            return;
        };
        if let Err(err) = handle.await {
            warn!(error = %err, "worker pool dispatcher stopped abnormally");
        }
    }
}

async fn dispatch(mut receiver: mpsc::Receiver<Job>, permits: Arc<Semaphore>) {
    let mut running = JoinSet::new();
    // A job leaves the queue only once a worker is free, so the queue bound is exact.
    while let Ok(permit) = Arc::clone(&permits).acquire_owned().await {
        let Some(job) = receiver.recv().await else {
            drop(permit);
            break;
        };
        running.spawn(async move {
            job.await;
            drop(permit);
        });
        while let Some(finished) = running.try_join_next() {
            log_join(&finished);
        }
    }
    while let Some(finished) = running.join_next().await {
        log_join(&finished);
    }
    debug!("worker pool drained");
}

fn log_join(result: &Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        warn!(error = %err, "sync job panicked");
    }
}
