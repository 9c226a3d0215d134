//! Runs sync tasks on their schedules, or one task on demand.
//!
//! Usage:
//!
//! ```text
//! refsyncd <config-path>
//! refsyncd <config-path> run <task-key>
//! ```
//!
//! Without a command the daemon registers the repositories and tasks listed
//! in the configuration, closes runs orphaned by an earlier crash, starts
//! the cron triggers and serves until interrupted. With `run` it executes
//! one task immediately and exits with a failure status unless the run
//! succeeded.
//!
//! State lives in `PostgreSQL` when `database_url` is configured (pending
//! migrations are applied at start) and in memory otherwise.

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use refsync::config::{ConfigError, RefsyncConfig};
use refsync::guard::{
    adapters::{memory::InMemoryExecutionGuard, postgres::PostgresExecutionGuard},
    ports::ExecutionGuard,
};
use refsync::scheduler::{Scheduler, SchedulerError, WorkerPool};
use refsync::sync::{
    adapters::{
        credentials::RecordCredentialResolver,
        git_cli::GitCliGateway,
        memory::{InMemorySyncCatalog, InMemorySyncRunRepository},
        notifier::TracingRunNotifier,
        postgres::{PostgresSyncCatalog, PostgresSyncRunRepository, SyncPgPool, apply_migrations},
    },
    domain::{SyncTaskKey, TriggerSource},
    ports::{NoopScheduleHook, ScheduleHook, SyncCatalog, SyncRunRepository},
    services::{
        ExecuteError, FastForwardEngine, LedgerError, RunLedger, SyncExecutor, SyncRunner,
        SyncTaskService, SyncTaskServiceError,
    },
};
use refsync::telemetry::init_tracing;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::util::TryInitError;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Executor<C, L> = SyncExecutor<
    C,
    L,
    GitCliGateway,
    RecordCredentialResolver,
    TracingRunNotifier,
    DefaultClock,
>;

/// Errors that stop the daemon.
#[derive(Debug, Error)]
enum DaemonError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to install log subscriber: {0}")]
    Telemetry(#[from] TryInitError),
    #[error("database unavailable: {0}")]
    Database(#[source] BoxError),
    #[error("failed to register {what}: {source}")]
    Seed {
        what: String,
        #[source]
        source: SyncTaskServiceError,
    },
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("failed to reconcile orphaned runs: {0}")]
    Reconcile(#[from] LedgerError),
    #[error(transparent)]
    Execute(#[from] ExecuteError),
    #[error("failed to wait for a shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Serve,
    RunOnce(SyncTaskKey),
}

#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    config_path: PathBuf,
    mode: Mode,
}

/// Storage and lease backends chosen from the configuration.
struct Backends<C, L, G> {
    catalog: Arc<C>,
    runs: Arc<L>,
    guard: Arc<G>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let invocation = parse_args(std::env::args())?;
    let config = RefsyncConfig::load(&invocation.config_path)?;
    init_tracing(config.log_format)?;

    if let Some(url) = config.database_url.as_ref() {
        let pool = open_pool(url.expose().to_owned()).await?;
        let guard = Arc::new(PostgresExecutionGuard::new(pool.clone()));
        let sweeper = guard.spawn_sweeper(config.sweep_interval());
        let backends = Backends {
            catalog: Arc::new(PostgresSyncCatalog::new(pool.clone())),
            runs: Arc::new(PostgresSyncRunRepository::new(pool)),
            guard,
        };
        let outcome = run(&config, invocation.mode, backends).await;
        sweeper.abort();
        outcome?;
    } else {
        warn!("no database_url configured; tasks and runs are kept in memory");
        let guard = Arc::new(InMemoryExecutionGuard::new());
        let sweeper = guard.spawn_sweeper(config.sweep_interval());
        let backends = Backends {
            catalog: Arc::new(InMemorySyncCatalog::new()),
            runs: Arc::new(InMemorySyncRunRepository::new()),
            guard,
        };
        let outcome = run(&config, invocation.mode, backends).await;
        sweeper.abort();
        outcome?;
    }
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Invocation, DaemonError> {
    let _program = args.next();
    let config_path = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| DaemonError::InvalidArgs("missing config path argument".into()))?;
    let mode = match args.next().as_deref() {
        None => Mode::Serve,
        Some("run") => {
            let raw = args
                .next()
                .ok_or_else(|| DaemonError::InvalidArgs("missing task key after 'run'".into()))?;
            let key =
                SyncTaskKey::new(raw).map_err(|err| DaemonError::InvalidArgs(err.to_string()))?;
            Mode::RunOnce(key)
        }
        Some(other) => {
            return Err(DaemonError::InvalidArgs(format!(
                "unknown command '{other}'; expected run"
            )));
        }
    };
    if let Some(extra) = args.next() {
        return Err(DaemonError::InvalidArgs(format!(
            "unexpected extra argument: {extra}"
        )));
    }
    Ok(Invocation { config_path, mode })
}

async fn open_pool(url: String) -> Result<SyncPgPool, DaemonError> {
    tokio::task::spawn_blocking(move || -> Result<SyncPgPool, BoxError> {
        let pool = Pool::builder().build(ConnectionManager::<PgConnection>::new(url))?;
        let mut connection = pool.get()?;
        let applied = apply_migrations(&mut connection)?;
        if !applied.is_empty() {
            info!(versions = ?applied, "applied schema migrations");
        }
        Ok(pool)
    })
    .await
    .map_err(|err| DaemonError::Database(Box::new(err)))?
    .map_err(DaemonError::Database)
}

async fn run<C, L, G>(
    config: &RefsyncConfig,
    mode: Mode,
    backends: Backends<C, L, G>,
) -> Result<(), DaemonError>
where
    C: SyncCatalog + 'static,
    L: SyncRunRepository + 'static,
    G: ExecutionGuard + 'static,
{
    let clock = Arc::new(DefaultClock);
    let executor: Arc<Executor<C, L>> = Arc::new(SyncExecutor::new(
        Arc::clone(&backends.catalog),
        RunLedger::new(Arc::clone(&backends.runs), Arc::clone(&clock)),
        FastForwardEngine::new(
            Arc::new(GitCliGateway::new(&config.git_binary, config.git_timeout())),
            Arc::new(RecordCredentialResolver::new()),
            Arc::clone(&clock),
        ),
        Arc::new(TracingRunNotifier::new()),
    ));

    match mode {
        Mode::RunOnce(key) => {
            let service = SyncTaskService::new(
                Arc::clone(&backends.catalog),
                Arc::new(NoopScheduleHook),
                Arc::clone(&clock),
            );
            seed(&service, config).await?;
            let sync_run = executor.run(&key, TriggerSource::Manual).await?;
            info!(
                task = %key,
                run = %sync_run.id(),
                commit_range = sync_run.commit_range(),
                "sync run succeeded"
            );
            Ok(())
        }
        Mode::Serve => serve(config, backends, executor, clock).await,
    }
}

async fn serve<C, L, G>(
    config: &RefsyncConfig,
    backends: Backends<C, L, G>,
    executor: Arc<Executor<C, L>>,
    clock: Arc<DefaultClock>,
) -> Result<(), DaemonError>
where
    C: SyncCatalog + 'static,
    L: SyncRunRepository + 'static,
    G: ExecutionGuard + 'static,
{
    let orphaned = RunLedger::new(Arc::clone(&backends.runs), Arc::clone(&clock))
        .reconcile_orphaned(config.orphan_age())
        .await?;
    if !orphaned.is_empty() {
        warn!(count = orphaned.len(), "closed runs left running by an earlier process");
    }

    let pool = Arc::new(WorkerPool::start(config.pool_settings())?);
    let scheduler = Arc::new(Scheduler::new(
        executor,
        backends.guard,
        Arc::clone(&backends.catalog),
        pool,
        Arc::clone(&clock),
        config.scheduler_settings(),
    )?);
    let service = SyncTaskService::new(backends.catalog, Arc::clone(&scheduler), clock);
    seed(&service, config).await?;
    let scheduled = scheduler.reload_from_catalog().await?;
    info!(scheduled, "refsyncd started");

    let signal = shutdown_signal().await;
    info!("shutting down");
    scheduler.shutdown().await;
    signal
}

async fn seed<C, H>(
    service: &SyncTaskService<C, H, DefaultClock>,
    config: &RefsyncConfig,
) -> Result<(), DaemonError>
where
    C: SyncCatalog,
    H: ScheduleHook,
{
    for repository in &config.repositories {
        service
            .upsert_repository(repository.registration())
            .await
            .map_err(|source| DaemonError::Seed {
                what: format!("repository {}", repository.key),
                source,
            })?;
    }
    for task in &config.tasks {
        service
            .upsert_task(task.key.clone(), task.settings())
            .await
            .map_err(|source| DaemonError::Seed {
                what: format!("task {}", task.key),
                source,
            })?;
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<(), DaemonError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).map_err(DaemonError::Signal)?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map_err(DaemonError::Signal),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<(), DaemonError> {
    tokio::signal::ctrl_c().await.map_err(DaemonError::Signal)
}
