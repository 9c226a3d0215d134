//! Infrastructure adapters for the sync module.
//!
//! # Available Adapters
//!
//! - [`memory`]: thread-safe in-memory catalog, run ledger, notifier and git
//!   world for tests and database-less operation
//! - [`postgres`]: `PostgreSQL` catalog and run ledger using Diesel
//! - [`git_cli::GitCliGateway`]: git access through the `git` binary
//! - [`credentials::RecordCredentialResolver`]: credentials taken from the
//!   repository record
//! - [`notifier::TracingRunNotifier`]: run completion events as tracing
//!   output

pub mod credentials;
pub mod git_cli;
pub mod memory;
pub mod notifier;
pub mod postgres;
