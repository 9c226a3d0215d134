//! Unit tests for the sync bounded context.

mod merge_tests;
mod support;
