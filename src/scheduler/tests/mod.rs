//! Unit tests for the scheduler and the worker pool.

mod pool_tests;
mod scheduler_tests;
mod support;
