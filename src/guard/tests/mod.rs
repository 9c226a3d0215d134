//! Unit tests for the execution guard.
