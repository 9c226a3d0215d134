//! Lease-based mutual exclusion for scheduled executions.
//!
//! A lease is keyed by the job it protects and held by one guard handle
//! until it is released or its TTL elapses. Backends:
//!
//! - [`adapters::memory::InMemoryExecutionGuard`] for a single process
//! - [`adapters::postgres::PostgresExecutionGuard`] shared between instances

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
