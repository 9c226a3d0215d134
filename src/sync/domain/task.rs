//! Sync task aggregate and its scheduling/push configuration values.

use super::{BranchName, RemoteName, RepositoryKey, SyncDomainError, SyncTaskKey};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Minimum webhook token length.
const MIN_WEBHOOK_TOKEN_LENGTH: usize = 16;

/// Day names indexed by standard cron day-of-week number.
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// One side of a sync direction: repository, remote, and branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEndpoint {
    repository: RepositoryKey,
    remote: RemoteName,
    branch: BranchName,
}

impl SyncEndpoint {
    /// Creates an endpoint from validated components.
    #[must_use]
    pub const fn new(repository: RepositoryKey, remote: RemoteName, branch: BranchName) -> Self {
        Self {
            repository,
            remote,
            branch,
        }
    }

    /// Creates an endpoint from raw values.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncDomainError`] when any component is invalid.
    pub fn from_parts(
        repository: &str,
        remote: &str,
        branch: &str,
    ) -> Result<Self, SyncDomainError> {
        Ok(Self::new(
            RepositoryKey::new(repository)?,
            RemoteName::new(remote)?,
            BranchName::new(branch)?,
        ))
    }

    /// Returns the repository key.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryKey {
        &self.repository
    }

    /// Returns the remote name.
    #[must_use]
    pub const fn remote(&self) -> &RemoteName {
        &self.remote
    }

    /// Returns the branch name.
    #[must_use]
    pub const fn branch(&self) -> &BranchName {
        &self.branch
    }
}

impl fmt::Display for SyncEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.repository, self.remote, self.branch)
    }
}

/// Raw flags forwarded verbatim to the push command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct PushOptions(Vec<String>);

impl PushOptions {
    /// Creates validated push options.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidPushOption`] for any entry that is
    /// not a flag starting with `-`.
    pub fn new(options: impl IntoIterator<Item = String>) -> Result<Self, SyncDomainError> {
        let mut validated = Vec::new();
        for option in options {
            let trimmed = option.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !trimmed.starts_with('-') || trimmed.chars().any(char::is_control) {
                return Err(SyncDomainError::InvalidPushOption(option));
            }
            validated.push(trimmed.to_owned());
        }
        Ok(Self(validated))
    }

    /// Returns the options in order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` when no options are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for PushOptions {
    type Error = SyncDomainError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PushOptions> for Vec<String> {
    fn from(value: PushOptions) -> Self {
        value.0
    }
}

/// Validated cron expression with five or six fields.
///
/// Five-field expressions (minute resolution) are normalised to six fields
/// by prepending a zero seconds field. The day-of-week field uses standard
/// cron numbering (0 and 7 are Sunday, 1 is Monday) and is rewritten to day
/// names, since the `cron` crate counts Sunday as 1.
///
/// # Examples
///
///     use refsync::sync::domain::CronExpression;
///
///     let cron = CronExpression::new("*/15 * * * *").expect("valid cron");
///     assert_eq!(cron.normalized(), "0 */15 * * * *");
///
///     let weekdays = CronExpression::new("0 2 * * 1-5").expect("valid cron");
///     assert_eq!(weekdays.normalized(), "0 0 2 * * MON,TUE,WED,THU,FRI");
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronExpression {
    raw: String,
    normalized: String,
}

impl CronExpression {
    /// Parses and validates a cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidCronExpression`] when the field count
    /// is wrong or the expression does not parse.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into().trim().to_owned();
        let mut fields: Vec<String> = raw.split_whitespace().map(str::to_owned).collect();
        let normalized = match fields.len() {
            1 if raw.starts_with('@') => raw.clone(),
            field_count @ (5 | 6) => {
                if let Some(day_of_week) = fields.last_mut() {
                    *day_of_week = day_of_week_names(day_of_week).map_err(|reason| {
                        SyncDomainError::InvalidCronExpression {
                            expression: raw.clone(),
                            reason,
                        }
                    })?;
                }
                if field_count == 5 {
                    fields.insert(0, "0".to_owned());
                }
                fields.join(" ")
            }
            field_count => {
                return Err(SyncDomainError::InvalidCronExpression {
                    expression: raw,
                    reason: format!("expected 5 or 6 fields, found {field_count}"),
                });
            }
        };

        cron::Schedule::from_str(&normalized).map_err(|err| {
            SyncDomainError::InvalidCronExpression {
                expression: raw.clone(),
                reason: err.to_string(),
            }
        })?;

        Ok(Self { raw, normalized })
    }

    /// Parses an optional expression where an empty string means "unscheduled".
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidCronExpression`] for a non-empty,
    /// invalid expression.
    pub fn parse_optional(value: &str) -> Result<Option<Self>, SyncDomainError> {
        if value.trim().is_empty() {
            return Ok(None);
        }
        Self::new(value).map(Some)
    }

    /// Returns the expression as supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the six-field form handed to the cron parser.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Builds the parsed schedule.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidCronExpression`] if parsing fails,
    /// which only happens for values constructed outside [`Self::new`].
    pub fn schedule(&self) -> Result<cron::Schedule, SyncDomainError> {
        cron::Schedule::from_str(&self.normalized).map_err(|err| {
            SyncDomainError::InvalidCronExpression {
                expression: self.raw.clone(),
                reason: err.to_string(),
            }
        })
    }
}

/// Rewrites a standard day-of-week field as a list of day names.
///
/// Accepts values, ranges, lists and steps over `0-7` or `SUN`-`SAT`.
fn day_of_week_names(field: &str) -> Result<String, String> {
    if matches!(field, "*" | "?") {
        return Ok(field.to_owned());
    }
    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((range, increment)) => (range, Some(day_step(increment)?)),
            None => (item, None),
        };
        let (first, last) = if base == "*" {
            (0, 7)
        } else if let Some((start, end)) = base.split_once('-') {
            (day_number(start)?, day_number(end)?)
        } else {
            let day = day_number(base)?;
            (day, if step.is_some() { 7 } else { day })
        };
        if first > last {
            return Err(format!("day-of-week range '{base}' runs backwards"));
        }
        for day in (first..=last).step_by(step.unwrap_or(1)) {
            days.insert(if day == 7 { 0 } else { day });
        }
    }
    Ok(days
        .iter()
        .filter_map(|day| DAY_NAMES.get(*day).copied())
        .collect::<Vec<_>>()
        .join(","))
}

fn day_number(token: &str) -> Result<usize, String> {
    if let Ok(number) = token.parse::<usize>() {
        return if number <= 7 {
            Ok(number)
        } else {
            Err(format!("day-of-week {number} is outside 0-7"))
        };
    }
    DAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .ok_or_else(|| format!("unknown day-of-week '{token}'"))
}

fn day_step(token: &str) -> Result<usize, String> {
    token
        .parse::<usize>()
        .ok()
        .filter(|step| *step > 0)
        .ok_or_else(|| format!("invalid day-of-week step '{token}'"))
}

impl TryFrom<String> for CronExpression {
    type Error = SyncDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CronExpression> for String {
    fn from(value: CronExpression) -> Self {
        value.raw
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Token that lets an external webhook trigger a task.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WebhookToken(String);

impl WebhookToken {
    /// Creates a validated webhook token.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidWebhookToken`] when the token is
    /// shorter than 16 characters or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into();
        if raw.len() < MIN_WEBHOOK_TOKEN_LENGTH || raw.chars().any(char::is_whitespace) {
            return Err(SyncDomainError::InvalidWebhookToken);
        }
        Ok(Self(raw))
    }

    /// Returns the token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WebhookToken {
    type Error = SyncDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WebhookToken> for String {
    fn from(value: WebhookToken) -> Self {
        value.0
    }
}

impl fmt::Debug for WebhookToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookToken(***)")
    }
}

/// Sync task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    key: SyncTaskKey,
    source: SyncEndpoint,
    target: SyncEndpoint,
    push_options: PushOptions,
    cron: Option<CronExpression>,
    enabled: bool,
    webhook_token: Option<WebhookToken>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted sync task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSyncTaskData {
    /// Persisted task key.
    pub key: SyncTaskKey,
    /// Persisted source endpoint.
    pub source: SyncEndpoint,
    /// Persisted target endpoint.
    pub target: SyncEndpoint,
    /// Persisted push options.
    pub push_options: PushOptions,
    /// Persisted cron expression.
    pub cron: Option<CronExpression>,
    /// Persisted enabled flag.
    pub enabled: bool,
    /// Persisted webhook token.
    pub webhook_token: Option<WebhookToken>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Mutable settings of a sync task, applied together on update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTaskSettings {
    /// Source endpoint.
    pub source: SyncEndpoint,
    /// Target endpoint.
    pub target: SyncEndpoint,
    /// Push options.
    pub push_options: PushOptions,
    /// Cron expression, `None` when unscheduled.
    pub cron: Option<CronExpression>,
    /// Whether scheduled runs are enabled.
    pub enabled: bool,
    /// Webhook token, `None` when webhook triggering is off.
    pub webhook_token: Option<WebhookToken>,
}

impl SyncTask {
    /// Creates a new sync task.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::LocalTargetRemote`] when the target remote
    /// is the `local` sentinel.
    pub fn new(
        key: SyncTaskKey,
        settings: SyncTaskSettings,
        clock: &impl Clock,
    ) -> Result<Self, SyncDomainError> {
        validate_settings(&settings)?;
        let timestamp = clock.utc();
        Ok(Self {
            key,
            source: settings.source,
            target: settings.target,
            push_options: settings.push_options,
            cron: settings.cron,
            enabled: settings.enabled,
            webhook_token: settings.webhook_token,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedSyncTaskData) -> Self {
        Self {
            key: data.key,
            source: data.source,
            target: data.target,
            push_options: data.push_options,
            cron: data.cron,
            enabled: data.enabled,
            webhook_token: data.webhook_token,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the immutable task key.
    #[must_use]
    pub const fn key(&self) -> &SyncTaskKey {
        &self.key
    }

    /// Returns the source endpoint.
    #[must_use]
    pub const fn source(&self) -> &SyncEndpoint {
        &self.source
    }

    /// Returns the target endpoint.
    #[must_use]
    pub const fn target(&self) -> &SyncEndpoint {
        &self.target
    }

    /// Returns the push options.
    #[must_use]
    pub const fn push_options(&self) -> &PushOptions {
        &self.push_options
    }

    /// Returns the cron expression, if scheduled.
    #[must_use]
    pub const fn cron(&self) -> Option<&CronExpression> {
        self.cron.as_ref()
    }

    /// Returns whether the task is enabled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the webhook token, if any.
    #[must_use]
    pub const fn webhook_token(&self) -> Option<&WebhookToken> {
        self.webhook_token.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns `true` when the scheduler should hold a trigger for this task.
    #[must_use]
    pub const fn is_schedulable(&self) -> bool {
        self.enabled && self.cron.is_some()
    }

    /// Returns the current mutable settings.
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

    /// Replaces the mutable settings. The key never changes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::LocalTargetRemote`] when the new target
    /// remote is the `local` sentinel; the task is left unchanged.
    pub fn apply(
        &mut self,
        settings: SyncTaskSettings,
        clock: &impl Clock,
    ) -> Result<(), SyncDomainError> {
        validate_settings(&settings)?;
        self.source = settings.source;
        self.target = settings.target;
        self.push_options = settings.push_options;
        self.cron = settings.cron;
        self.enabled = settings.enabled;
        self.webhook_token = settings.webhook_token;
        self.updated_at = clock.utc();
        Ok(())
    }
}

fn validate_settings(settings: &SyncTaskSettings) -> Result<(), SyncDomainError> {
    if settings.target.remote().is_local() {
        return Err(SyncDomainError::LocalTargetRemote);
    }
    Ok(())
}
