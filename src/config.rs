//! Daemon configuration loaded from YAML with environment overrides.
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Seed `repositories` and `tasks` are deserialised straight into validated
//! domain values; a malformed branch name or cron expression fails the load.
//!
//! ```yaml
//! lease_ttl_secs: 600
//! worker_concurrency: 4
//! log_format: json
//! repositories:
//!   - key: app
//!     path: /srv/app
//!     credentials:
//!       default:
//!         type: ssh_key
//!         private_key_path: /etc/refsync/deploy_key
//! tasks:
//!   - key: nightly-mirror
//!     source: { repository: app, remote: local, branch: main }
//!     target: { repository: app, remote: origin, branch: main }
//!     cron: "0 2 * * *"
//! ```

use crate::scheduler::{PoolSettings, SchedulerSettings};
use crate::sync::{
    domain::{
        CronExpression, PushOptions, RemoteCredentials, RepositoryKey, Secret, SyncEndpoint,
        SyncTaskKey, SyncTaskSettings, WebhookToken,
    },
    services::RepositoryRegistration,
};
use serde::{Deserialize, Deserializer, de};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Overrides [`RefsyncConfig::database_url`].
pub const ENV_DATABASE_URL: &str = "REFSYNC_DATABASE_URL";
/// Overrides [`RefsyncConfig::lease_ttl_secs`].
pub const ENV_LEASE_TTL_SECS: &str = "REFSYNC_LEASE_TTL_SECS";
/// Overrides [`RefsyncConfig::worker_concurrency`].
pub const ENV_WORKER_CONCURRENCY: &str = "REFSYNC_WORKER_CONCURRENCY";
/// Overrides [`RefsyncConfig::queue_capacity`].
pub const ENV_QUEUE_CAPACITY: &str = "REFSYNC_QUEUE_CAPACITY";
/// Overrides [`RefsyncConfig::git_binary`].
pub const ENV_GIT_BINARY: &str = "REFSYNC_GIT_BINARY";

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The YAML did not match the configuration schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// An environment override held an unusable value.
    #[error("{variable} must be a non-negative integer, got {value:?}")]
    InvalidOverride {
        /// Variable name.
        variable: &'static str,
        /// Raw value found in the environment.
        value: String,
    },
    /// A sizing or timing field was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Repository registered at daemon start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySeed {
    /// Repository key.
    pub key: RepositoryKey,
    /// Working repository path.
    pub path: PathBuf,
    /// Fallback remote URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Default credential and per-remote overrides.
    #[serde(default)]
    pub credentials: RemoteCredentials,
}

impl RepositorySeed {
    /// Converts the seed into a registration request.
    #[must_use]
    pub fn registration(&self) -> RepositoryRegistration {
        RepositoryRegistration {
            key: self.key.clone(),
            path: self.path.clone(),
            registered_url: self.url.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

/// Sync task created at daemon start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSeed {
    /// Task key.
    pub key: SyncTaskKey,
    /// Where commits come from.
    pub source: SyncEndpoint,
    /// Branch that is moved.
    pub target: SyncEndpoint,
    /// Extra push flags.
    #[serde(default)]
    pub push_options: PushOptions,
    /// Cron expression; absent or empty for manual-only tasks.
    #[serde(default, deserialize_with = "optional_cron")]
    pub cron: Option<CronExpression>,
    /// Whether scheduled runs are enabled.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Webhook token.
    #[serde(default)]
    pub webhook_token: Option<WebhookToken>,
}

const fn enabled_by_default() -> bool {
    true
}

fn optional_cron<'de, D>(deserializer: D) -> Result<Option<CronExpression>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    CronExpression::parse_optional(value.as_deref().unwrap_or_default())
        .map_err(de::Error::custom)
}

impl TaskSeed {
    /// Returns the task settings described by the seed.
    #[must_use]
    pub fn settings(&self) -> SyncTaskSettings {
        SyncTaskSettings {
            source: self.source.clone(),
            target: self.target.clone(),
            push_options: self.push_options.clone(),
            cron: self.cron.clone(),
            enabled: self.enabled,
            webhook_token: self.webhook_token.clone(),
        }
    }
}

/// Runtime configuration of the sync daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefsyncConfig {
    /// Lifetime of a cron execution lease in seconds.
    pub lease_ttl_secs: u64,
    /// Interval between expired-lease sweeps in seconds.
    pub sweep_interval_secs: u64,
    /// Runs older than this many lease lifetimes are reconciled as orphaned.
    pub orphan_multiplier: u32,
    /// Sync jobs running at the same time.
    pub worker_concurrency: usize,
    /// Queued sync jobs before triggers are refused.
    pub queue_capacity: usize,
    /// Git executable.
    pub git_binary: PathBuf,
    /// Timeout of one git command in seconds.
    pub git_timeout_secs: u64,
    /// `PostgreSQL` connection string; in-memory storage when absent.
    pub database_url: Option<Secret>,
    /// Log output format.
    pub log_format: LogFormat,
    /// Repositories registered at start.
    pub repositories: Vec<RepositorySeed>,
    /// Tasks created at start.
    pub tasks: Vec<TaskSeed>,
}

impl Default for RefsyncConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: 600,
            sweep_interval_secs: 60,
            orphan_multiplier: 3,
            worker_concurrency: 4,
            queue_capacity: 64,
            git_binary: PathBuf::from("git"),
            git_timeout_secs: 300,
            database_url: None,
            log_format: LogFormat::Text,
            repositories: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

impl RefsyncConfig {
    /// Reads `path`, applies process environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file is unreadable or malformed,
    /// an override is not a number, or a sizing field is zero.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses YAML without consulting the environment.
    ///
    /// An empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML, unknown fields or
    /// invalid seed values.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Applies overrides found through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] when a numeric override does
    /// not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|value| !value.trim().is_empty()) {
            self.database_url = Some(Secret::new(url));
        }
        if let Some(value) = lookup(ENV_LEASE_TTL_SECS) {
            self.lease_ttl_secs = parse_override(ENV_LEASE_TTL_SECS, value)?;
        }
        if let Some(value) = lookup(ENV_WORKER_CONCURRENCY) {
            self.worker_concurrency = parse_override(ENV_WORKER_CONCURRENCY, value)?;
        }
        if let Some(value) = lookup(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = parse_override(ENV_QUEUE_CAPACITY, value)?;
        }
        if let Some(binary) = lookup(ENV_GIT_BINARY).filter(|value| !value.trim().is_empty()) {
            self.git_binary = PathBuf::from(binary);
        }
        Ok(())
    }

    /// Rejects zero sizes and intervals.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] naming the first offending field.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.lease_ttl_secs == 0 {
            return Err(ConfigError::Zero("lease_ttl_secs"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Zero("sweep_interval_secs"));
        }
        if self.orphan_multiplier == 0 {
            return Err(ConfigError::Zero("orphan_multiplier"));
        }
        if self.worker_concurrency == 0 {
            return Err(ConfigError::Zero("worker_concurrency"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        if self.git_timeout_secs == 0 {
            return Err(ConfigError::Zero("git_timeout_secs"));
        }
        Ok(())
    }

    /// Lifetime of a cron execution lease.
    #[must_use]
    pub const fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// Interval between expired-lease sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Age after which a still-running run counts as orphaned.
    #[must_use]
    pub fn orphan_age(&self) -> Duration {
        Duration::from_secs(
            self.lease_ttl_secs
                .saturating_mul(u64::from(self.orphan_multiplier)),
        )
    }

    /// Timeout of one git command.
    #[must_use]
    pub const fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    /// Worker pool sizing.
    #[must_use]
    pub const fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            concurrency: self.worker_concurrency,
            queue_capacity: self.queue_capacity,
        }
    }

    /// Scheduler tuning.
    #[must_use]
    pub const fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            lease_ttl: self.lease_ttl(),
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    variable: &'static str,
    value: String,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { variable, value })
}
