//! # Noctua Domain
//!
//! Domain types and models for the noctua sleep-schedule aggregator.
//!
//! This crate contains:
//! - Presence and sleep domain types (PresenceEvent, OfflineInterval, SleepWindow, ...)
//! - Domain error types and Result definitions
//! - Configuration structures with operational defaults
//!
//! ## Architecture
//! - No dependencies on other noctua crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
