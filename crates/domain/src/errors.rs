//! Error types used throughout the aggregator

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for noctua
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum NoctuaError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage contention: {0}")]
    Contention(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NoctuaError {
    /// Transient storage contention, safe to retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention(_))
    }

    /// Storage cannot be reached at all; aborts the whole pass, not one user.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type alias for noctua operations
pub type Result<T> = std::result::Result<T, NoctuaError>;
