//! Step definitions for fast-forward synchronisation scenarios.

mod given;
mod then;
mod when;
pub mod world;
