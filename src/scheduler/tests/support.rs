//! Test doubles for scheduler tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::{Clock, DefaultClock};
use tokio::time::Instant;

use crate::guard::adapters::memory::InMemoryExecutionGuard;
use crate::scheduler::{PoolSettings, Scheduler, SchedulerSettings, WorkerPool};
use crate::sync::{
    adapters::memory::InMemorySyncCatalog,
    domain::{
        CronExpression, PushOptions, SyncEndpoint, SyncRun, SyncTask, SyncTaskKey,
        SyncTaskSettings, TriggerSource, WebhookToken,
    },
    ports::SyncCatalog,
    services::{ExecuteError, SyncRunner},
};

pub(super) type TestScheduler =
    Scheduler<RecordingRunner, InMemoryExecutionGuard, InMemorySyncCatalog, TokioClock>;

/// Wall clock that advances with tokio's (possibly paused) time.
#[derive(Debug)]
pub(super) struct TokioClock {
    origin: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    /// Starts at 2026-03-01T12:00:30Z.
    pub(super) fn new() -> Self {
        Self {
            origin: Utc
                .with_ymd_and_hms(2026, 3, 1, 12, 0, 30)
                .single()
                .expect("valid timestamp"),
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or_default();
        self.origin + elapsed
    }
}

/// Runner that records every call and optionally takes its time or panics.
#[derive(Debug, Default)]
pub(super) struct RecordingRunner {
    calls: Mutex<Vec<(SyncTaskKey, TriggerSource)>>,
    duration: Duration,
    panics: bool,
}

impl RecordingRunner {
    pub(super) fn taking(duration: Duration) -> Self {
        Self {
            calls: Mutex::default(),
            duration,
            panics: false,
        }
    }

    pub(super) fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::default()
        }
    }

    pub(super) fn calls(&self) -> Vec<(SyncTaskKey, TriggerSource)> {
        self.calls.lock().expect("runner lock").clone()
    }
}

#[async_trait]
impl SyncRunner for RecordingRunner {
    async fn run(
        &self,
        key: &SyncTaskKey,
        trigger: TriggerSource,
    ) -> Result<SyncRun, ExecuteError> {
        self.calls
            .lock()
            .expect("runner lock")
            .push((key.clone(), trigger));
        assert!(!self.panics, "runner blew up");
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
        Ok(SyncRun::start(key.clone(), trigger, &DefaultClock))
    }
}

pub(super) fn key(value: &str) -> SyncTaskKey {
    SyncTaskKey::new(value).expect("valid task key")
}

/// Task syncing `app` local main to origin main.
pub(super) fn task(
    value: &str,
    cron: Option<&str>,
    enabled: bool,
    token: Option<&str>,
) -> SyncTask {
    let settings = SyncTaskSettings {
        source: SyncEndpoint::from_parts("app", "local", "main").expect("valid endpoint"),
        target: SyncEndpoint::from_parts("app", "origin", "main").expect("valid endpoint"),
        push_options: PushOptions::default(),
        cron: cron.map(|expression| CronExpression::new(expression).expect("valid cron")),
        enabled,
        webhook_token: token.map(|raw| WebhookToken::new(raw).expect("valid token")),
    };
    SyncTask::new(key(value), settings, &DefaultClock).expect("valid task")
}

/// One scheduler instance plus the shared pieces a test inspects.
pub(super) struct Instance {
    pub(super) scheduler: TestScheduler,
    pub(super) runner: Arc<RecordingRunner>,
    pub(super) guard: InMemoryExecutionGuard,
    pub(super) catalog: Arc<InMemorySyncCatalog>,
}

impl Instance {
    pub(super) fn new() -> Self {
        Self::sharing(
            Arc::new(RecordingRunner::default()),
            InMemoryExecutionGuard::new(),
            Arc::new(InMemorySyncCatalog::new()),
        )
    }

    /// Another instance over the same runner, lease table and catalog.
    pub(super) fn sharing(
        runner: Arc<RecordingRunner>,
        guard: InMemoryExecutionGuard,
        catalog: Arc<InMemorySyncCatalog>,
    ) -> Self {
        let pool = WorkerPool::start(PoolSettings {
            concurrency: 2,
            queue_capacity: 8,
        })
        .expect("runtime available");
        let scheduler = Scheduler::new(
            Arc::clone(&runner),
            Arc::new(guard.handle()),
            Arc::clone(&catalog),
            Arc::new(pool),
            Arc::new(TokioClock::new()),
            SchedulerSettings::default(),
        )
        .expect("runtime available");
        Self {
            scheduler,
            runner,
            guard,
            catalog,
        }
    }

    pub(super) async fn store(&self, stored: &SyncTask) {
        self.catalog.store_task(stored).await.expect("task stored");
    }
}

/// Lets spawned tasks run without moving paused time noticeably.
pub(super) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
