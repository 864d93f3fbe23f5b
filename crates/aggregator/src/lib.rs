//! # Noctua Aggregator
//!
//! The batch binary that runs one aggregation pass over the shared presence
//! store. This library half exposes the dependency wiring so integration
//! tests can drive full passes against temporary databases.

pub mod context;
pub mod logging;

pub use context::AppContext;
