//! Anomaly flags raised against the per-user baseline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of deviation detected for a user-date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// No plausible sleep window despite recorded history.
    MissingWindow,
    ShortDuration,
    LongDuration,
    ShiftedStart,
    ShiftedEnd,
    /// Brief nocturnal wake inside the inferred window (small-hours
    /// reconnection absorbed by gap-merging).
    Doomscroll,
}

crate::impl_status_conversions!(AnomalyKind {
    MissingWindow => "missing_window",
    ShortDuration => "short_duration",
    LongDuration => "long_duration",
    ShiftedStart => "shifted_start",
    ShiftedEnd => "shifted_end",
    Doomscroll => "doomscroll"
});

/// A single flagged deviation, write-once per (user, date, kind)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    pub user_id: i64,
    pub local_date: NaiveDate,
    pub kind: AnomalyKind,
    /// Deviation size in minutes; the expected duration for missing windows.
    pub magnitude: f64,
}

impl Anomaly {
    pub fn new(user_id: i64, local_date: NaiveDate, kind: AnomalyKind, magnitude: f64) -> Self {
        Self { id: Uuid::now_v7().to_string(), user_id, local_date, kind, magnitude }
    }
}
