//! In-memory adapter implementations.
//!
//! These adapters are thread-safe and keep all state behind shared locks,
//! which makes them suitable for unit tests and for running the daemon
//! without a database.

mod catalog;
mod git;
mod notifier;
mod runs;

pub use catalog::InMemorySyncCatalog;
pub use git::InMemoryGitGateway;
pub use notifier::RecordingRunNotifier;
pub use runs::InMemorySyncRunRepository;
