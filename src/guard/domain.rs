//! Lease identity types.

use crate::sync::domain::SyncTaskKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix of leases protecting cron firings of a sync task.
pub const CRON_TASK_LEASE_PREFIX: &str = "cron:task:";

/// Name of a guarded resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseKey(String);

impl LeaseKey {
    /// Creates a lease key from an arbitrary name.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the key guarding cron firings of `task`.
    ///
    /// # Examples
    ///
    ///     use refsync::guard::domain::LeaseKey;
    ///     use refsync::sync::domain::SyncTaskKey;
    ///
    ///     let task = SyncTaskKey::new("nightly").expect("valid key");
    ///     assert_eq!(LeaseKey::for_task(&task).as_str(), "cron:task:nightly");
    #[must_use]
    pub fn for_task(task: &SyncTaskKey) -> Self {
        Self(format!("{CRON_TASK_LEASE_PREFIX}{task}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marker identifying one guard handle as the holder of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseHolder(Uuid);

impl LeaseHolder {
    /// Generates a fresh holder marker.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for LeaseHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
