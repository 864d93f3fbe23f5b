//! Night windows: the nightly span a date's sleep is looked for in.
//!
//! A window belongs to the evening's local date and runs into the following
//! day (default 18:00 through 12:00 next day). Bounds are built in the
//! user's timezone and converted to UTC, so windows around DST transitions
//! are longer or shorter in absolute terms, exactly as the night was.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use noctua_domain::InferenceConfig;

use crate::circular;

/// The candidate span for one local date's sleep, in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl NightWindow {
    /// Build the window for `date` in `tz`.
    pub fn for_date(date: NaiveDate, tz: Tz, config: &InferenceConfig) -> Self {
        let start_local = date.and_time(time_of_day(config.night_window_start_minutes));
        let end_local = date
            .succ_opt()
            .unwrap_or(NaiveDate::MAX)
            .and_time(time_of_day(config.night_window_end_minutes));

        Self { date, start: resolve_local(tz, start_local), end: resolve_local(tz, end_local) }
    }

    /// Overlap duration with `[start, end)`, zero when disjoint.
    pub fn overlap(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
        let from = self.start.max(start);
        let to = self.end.min(end);
        if to > from {
            to - from
        } else {
            Duration::zero()
        }
    }

    /// Whether `[start, end)` touches the window at all.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }

    /// A window is closable only once it lies entirely in the past.
    pub fn has_elapsed(&self, reference: DateTime<Utc>) -> bool {
        reference >= self.end
    }

    /// The local date whose window a local instant is attributed to: times
    /// before the window-end hour belong to the previous evening.
    pub fn anchor_date(local: &DateTime<Tz>, config: &InferenceConfig) -> NaiveDate {
        if circular::minutes_of_day(local) >= f64::from(config.night_window_end_minutes) {
            local.date_naive()
        } else {
            local.date_naive().pred_opt().unwrap_or(NaiveDate::MIN)
        }
    }

    /// Latest local date whose window has fully elapsed at `reference`.
    pub fn latest_elapsed_date(reference: DateTime<Utc>, tz: Tz, config: &InferenceConfig) -> NaiveDate {
        let mut date = reference.with_timezone(&tz).date_naive();
        // Windows end on the following local day, so this backs up at most
        // two days before finding an elapsed one.
        while !Self::for_date(date, tz, config).has_elapsed(reference) {
            date = match date.pred_opt() {
                Some(previous) => previous,
                None => return NaiveDate::MIN,
            };
        }
        date
    }
}

fn time_of_day(minutes: u32) -> NaiveTime {
    let minutes = minutes.min(23 * 60 + 59);
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// Resolve a local wall-clock time to UTC.
///
/// DST fold takes the earlier occurrence; a DST gap (the wall time never
/// happened) shifts forward past the transition.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map_or_else(|| tz.from_utc_datetime(&naive).with_timezone(&Utc), |dt| {
                    dt.with_timezone(&Utc)
                })
        }
    }
}
