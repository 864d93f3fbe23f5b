//! # Noctua Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite implementations of the event and aggregate stores
//! - Connection pooling, migrations, and bounded write retry
//! - Configuration loading (files + environment overrides)
//!
//! ## Architecture
//! - Implements traits defined in `noctua-core`
//! - Depends on `noctua-domain` and `noctua-core`
//! - Contains all "impure" code (I/O, clocks, environment)

pub mod config;
pub mod database;
pub mod errors;

// Re-export commonly used items
pub use database::*;
pub use errors::InfraError;
