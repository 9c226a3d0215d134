//! Execution guard backends.

pub mod memory;
pub mod postgres;
