//! Derived sleep aggregates: offline intervals, sleep windows, baselines

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A brief reconnection absorbed into an offline interval by gap-merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeGap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WakeGap {
    /// Length of the gap in whole minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// A maximal contiguous offline span for one user
///
/// Derived from presence transitions and recomputable from them. Invariants:
/// `start < end`; intervals for a user never overlap; spans separated by less
/// than the merge threshold are coalesced, recording the absorbed gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineInterval {
    pub id: String,
    pub user_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Start was approximated at the watermark boundary (stream began
    /// mid-offline); reduces inference confidence.
    pub start_approximated: bool,
    pub wake_gaps: Vec<WakeGap>,
}

impl OfflineInterval {
    /// Create a closed interval with a fresh UUIDv7 id.
    pub fn new(user_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id,
            start,
            end,
            start_approximated: false,
            wake_gaps: Vec::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// True when `other` starts within `merge_gap` after this interval ends.
    pub fn merges_with(&self, next_start: DateTime<Utc>, merge_gap: Duration) -> bool {
        next_start >= self.end && next_start - self.end < merge_gap
    }
}

/// An interval still open at the end of a batch (user currently offline)
///
/// Carried across passes on the watermark row; becomes an `OfflineInterval`
/// once a closing transition arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInterval {
    pub start: DateTime<Utc>,
    pub start_approximated: bool,
    pub wake_gaps: Vec<WakeGap>,
    /// Id of the closed interval this one resumed, if any. Closing re-emits
    /// that id so the stored row is extended in place instead of duplicated.
    #[serde(default)]
    pub resumed_id: Option<String>,
}

impl OpenInterval {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { start, start_approximated: false, wake_gaps: Vec::new(), resumed_id: None }
    }

    /// Reopen a closed interval because a new offline transition landed
    /// within the merge gap of its end. The absorbed gap is recorded unless
    /// it is zero-length.
    pub fn resume(interval: OfflineInterval, reopened_at: DateTime<Utc>) -> Self {
        let mut wake_gaps = interval.wake_gaps;
        if reopened_at > interval.end {
            wake_gaps.push(WakeGap { start: interval.end, end: reopened_at });
        }
        Self {
            start: interval.start,
            start_approximated: interval.start_approximated,
            wake_gaps,
            resumed_id: Some(interval.id),
        }
    }

    /// Close the interval at `end`, producing a persistable row.
    pub fn close(self, user_id: i64, end: DateTime<Utc>) -> OfflineInterval {
        OfflineInterval {
            id: self.resumed_id.unwrap_or_else(|| Uuid::now_v7().to_string()),
            user_id,
            start: self.start,
            end,
            start_approximated: self.start_approximated,
            wake_gaps: self.wake_gaps,
        }
    }
}

/// The single offline interval per local day chosen as nighttime sleep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepWindow {
    pub id: String,
    pub user_id: i64,
    /// The local date whose night window this sleep belongs to (the
    /// evening's date, not the wake-up date).
    pub local_date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub confidence: f64,
}

impl SleepWindow {
    pub fn new(
        user_id: i64,
        local_date: NaiveDate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        confidence: f64,
    ) -> Self {
        Self { id: Uuid::now_v7().to_string(), user_id, local_date, start, end, confidence }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Rolling per-user summary of recent sleep windows
///
/// Medians, not means; start/end are circular minutes-of-day so schedules
/// straddling midnight do not average out to noon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub user_id: i64,
    pub median_start_minutes: f64,
    pub median_end_minutes: f64,
    pub median_duration_minutes: f64,
    /// Interquartile range of durations; deviation reference for anomalies.
    pub duration_spread_minutes: f64,
    pub sample_count: i64,
}

impl Baseline {
    /// Below the minimum sample count the baseline suppresses duration and
    /// shift flags; only evidence-intrinsic kinds may fire.
    pub fn is_sufficient(&self, min_samples: usize) -> bool {
        self.sample_count >= min_samples as i64
    }
}
