//! # Noctua Core
//!
//! Pure inference logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Interval building, sleep window inference, baselines, anomaly detection
//! - Port/adapter interfaces (traits) for the storage backends
//! - The aggregation pass orchestration service
//!
//! ## Architecture Principles
//! - Only depends on `noctua-domain`
//! - No database or platform code
//! - All external dependencies via traits
//! - Reference time is always an explicit argument, never ambient

pub mod aggregation;
pub mod anomaly;
pub mod baseline;
pub mod circular;
pub mod inference;
pub mod intervals;

// Re-export specific items to avoid ambiguity
pub use aggregation::ports::{AggregateStore, EventStore};
pub use aggregation::{AggregationService, UserTally};
pub use anomaly::AnomalyDetector;
pub use baseline::BaselineTracker;
pub use inference::{Inference, NightWindow, WindowInferencer};
pub use intervals::{BuiltIntervals, IntervalBuilder};
