//! Refsync: scheduled branch synchronisation between git remotes.
//!
//! A sync task moves a target branch to the head of a source branch when
//! that is a pure fast-forward. Tasks run on a cron schedule, on demand, or
//! from a webhook, and every execution is recorded in a run ledger.
//!
//! # Architecture
//!
//! Refsync follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (git, `PostgreSQL`, memory)
//!
//! # Modules
//!
//! - [`sync`]: Tasks, repositories, the fast-forward engine and the run ledger
//! - [`guard`]: Lease-based mutual exclusion across instances
//! - [`scheduler`]: Cron triggers and the bounded worker pool
//! - [`config`]: YAML configuration with environment overrides
//! - [`telemetry`]: Log subscriber bootstrap

pub mod config;
pub mod guard;
pub mod scheduler;
pub mod sync;
pub mod telemetry;
