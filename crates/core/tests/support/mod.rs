//! Shared test helpers for `noctua-core` integration tests.
//!
//! In-memory implementations of the storage ports so orchestration tests
//! can focus on pass behaviour instead of persistence plumbing.

pub mod stores;
