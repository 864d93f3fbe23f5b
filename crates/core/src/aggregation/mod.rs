//! Pass orchestration over the storage ports.

pub mod ports;
mod service;

pub use service::{AggregationService, UserTally};
