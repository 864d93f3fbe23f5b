//! Domain types and models
//!
//! Split by concern: presence input, derived sleep aggregates, anomaly
//! flags, and pass bookkeeping.

pub mod anomaly;
pub mod pass;
pub mod presence;
pub mod sleep;

pub use anomaly::{Anomaly, AnomalyKind};
pub use pass::{PassOutcome, PassSummary, UserBatch, UserFailure, Watermark};
pub use presence::{EventBatch, PresenceEvent, PresenceStatus, TrackedUser};
pub use sleep::{Baseline, OfflineInterval, OpenInterval, SleepWindow, WakeGap};
