//! Watermark cursor and per-pass bookkeeping

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::anomaly::Anomaly;
use super::sleep::{Baseline, OfflineInterval, OpenInterval, SleepWindow};

/// Per-user aggregation cursor
///
/// Owned exclusively by the aggregator and advanced only in the same
/// transaction as the derived rows it accounts for, so a crash between
/// passes never loses or duplicates events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    pub user_id: i64,
    /// Event-store rowid of the last consumed event; 0 before the first pass.
    pub last_event_id: i64,
    pub last_event_ts: Option<DateTime<Utc>>,
    /// Offline interval still open when the last batch ended.
    pub open_interval: Option<OpenInterval>,
    /// Most recent local date whose inference is finalized (window written
    /// or absence recorded). Inference resumes strictly after this date.
    pub last_closed_date: Option<NaiveDate>,
}

impl Watermark {
    /// Cursor for a user never processed before.
    pub fn initial(user_id: i64) -> Self {
        Self {
            user_id,
            last_event_id: 0,
            last_event_ts: None,
            open_interval: None,
            last_closed_date: None,
        }
    }
}

/// Everything one user's pass derived, committed in a single transaction
///
/// The watermark advance rides in the same write as the rows it accounts
/// for. Intervals are upserted by id (a resumed interval overwrites its
/// stored row); windows and anomalies are write-once under their unique
/// keys, so replaying a batch is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct UserBatch {
    pub user_id: i64,
    pub intervals: Vec<OfflineInterval>,
    pub windows: Vec<SleepWindow>,
    pub anomalies: Vec<Anomaly>,
    pub baseline: Option<Baseline>,
    pub watermark: Watermark,
}

impl UserBatch {
    /// A batch that would not change any stored row.
    pub fn is_empty(&self, previous: &Watermark) -> bool {
        self.intervals.is_empty()
            && self.windows.is_empty()
            && self.anomalies.is_empty()
            && self.baseline.is_none()
            && self.watermark == *previous
    }
}

/// One user's failure within an otherwise successful pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFailure {
    pub user_id: i64,
    pub error: String,
}

/// How a finished pass is reported to the invoking wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every user processed (or cleanly skipped with nothing to do).
    Complete,
    /// At least one user failed; their watermarks were not advanced.
    Partial,
    /// Storage was unreachable; nothing was committed.
    Fatal,
}

impl PassOutcome {
    /// Process exit code contract with the external scheduler: 0 full
    /// success, 2 partial, 1 fatal.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Complete => 0,
            Self::Partial => 2,
            Self::Fatal => 1,
        }
    }
}

/// Counters and failures accumulated over one aggregation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    pub reference_time: DateTime<Utc>,
    pub users_total: usize,
    pub users_processed: usize,
    /// Users with no resolvable timezone; surfaced in logs, not failures.
    pub users_skipped: usize,
    pub failures: Vec<UserFailure>,
    pub events_consumed: u64,
    pub events_skipped: u64,
    pub intervals_closed: u64,
    pub windows_inferred: u64,
    pub anomalies_flagged: u64,
}

impl PassSummary {
    pub fn new(reference_time: DateTime<Utc>) -> Self {
        Self {
            reference_time,
            users_total: 0,
            users_processed: 0,
            users_skipped: 0,
            failures: Vec::new(),
            events_consumed: 0,
            events_skipped: 0,
            intervals_closed: 0,
            windows_inferred: 0,
            anomalies_flagged: 0,
        }
    }

    pub fn outcome(&self) -> PassOutcome {
        if self.failures.is_empty() {
            PassOutcome::Complete
        } else {
            PassOutcome::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_watermark_is_empty() {
        let wm = Watermark::initial(42);
        assert_eq!(wm.last_event_id, 0);
        assert!(wm.last_event_ts.is_none());
        assert!(wm.open_interval.is_none());
        assert!(wm.last_closed_date.is_none());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PassOutcome::Complete.exit_code(), 0);
        assert_eq!(PassOutcome::Partial.exit_code(), 2);
        assert_eq!(PassOutcome::Fatal.exit_code(), 1);
    }

    #[test]
    fn test_summary_outcome_tracks_failures() {
        let mut summary = PassSummary::new(Utc::now());
        assert_eq!(summary.outcome(), PassOutcome::Complete);

        summary.failures.push(UserFailure { user_id: 1, error: "busy".into() });
        assert_eq!(summary.outcome(), PassOutcome::Partial);
    }
}
