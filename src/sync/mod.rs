//! Branch synchronisation between git remotes.
//!
//! A sync task names a source and a target endpoint (repository, remote,
//! branch). Executing it moves the target branch to the source head when
//! that is a pure fast-forward and records one run in the ledger whatever
//! the outcome. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
