//! Flags deviations of a date's inference from the user's baseline.
//!
//! Two families of evidence:
//! - baseline-relative kinds (duration and schedule shifts) require the
//!   baseline to have reached its minimum sample count, and the baseline
//!   compared against is always the state *before* the date was folded in
//! - intrinsic kinds need no history beyond the date itself: a missing
//!   window flags as soon as any baseline row exists, and doomscroll reads
//!   only the chosen interval's wake gaps

use chrono::NaiveDate;
use chrono_tz::Tz;
use noctua_domain::{Anomaly, AnomalyConfig, AnomalyKind, Baseline, WakeGap};

use crate::circular;
use crate::inference::Inference;

/// Per-date anomaly detection against a user baseline.
pub struct AnomalyDetector {
    config: AnomalyConfig,
    /// Baseline sample count below which duration/shift kinds stay quiet.
    min_samples: usize,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig, min_samples: usize) -> Self {
        Self { config, min_samples }
    }

    /// Evaluate one finalized date. `baseline` is the rolling state before
    /// this date's window was incorporated.
    pub fn detect(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        tz: Tz,
        inference: Option<&Inference>,
        baseline: Option<&Baseline>,
    ) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        let Some(inference) = inference else {
            // A user with any recorded history who produced no plausible
            // window is itself the signal.
            if let Some(baseline) = baseline {
                anomalies.push(Anomaly::new(
                    user_id,
                    local_date,
                    AnomalyKind::MissingWindow,
                    baseline.median_duration_minutes,
                ));
            }
            return anomalies;
        };

        if let Some(baseline) = baseline.filter(|b| b.is_sufficient(self.min_samples)) {
            self.check_duration(user_id, local_date, inference, baseline, &mut anomalies);
            self.check_shifts(user_id, local_date, tz, inference, baseline, &mut anomalies);
        }
        self.check_doomscroll(user_id, local_date, tz, inference, &mut anomalies);

        anomalies
    }

    fn check_duration(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        inference: &Inference,
        baseline: &Baseline,
        anomalies: &mut Vec<Anomaly>,
    ) {
        let duration = inference.window.duration_minutes() as f64;
        let deviation = duration - baseline.median_duration_minutes;
        // The spread is floored so a perfectly regular history does not
        // flag on one-minute wobble.
        let spread = baseline.duration_spread_minutes.max(self.config.duration_spread_floor_minutes);
        let threshold = self.config.duration_iqr_multiplier * spread;

        if deviation < -threshold {
            anomalies.push(Anomaly::new(
                user_id,
                local_date,
                AnomalyKind::ShortDuration,
                deviation.abs(),
            ));
        } else if deviation > threshold {
            anomalies.push(Anomaly::new(user_id, local_date, AnomalyKind::LongDuration, deviation));
        }
    }

    fn check_shifts(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        tz: Tz,
        inference: &Inference,
        baseline: &Baseline,
        anomalies: &mut Vec<Anomaly>,
    ) {
        let start_minutes = circular::minutes_of_day(&inference.window.start.with_timezone(&tz));
        let start_shift = circular::circular_distance(start_minutes, baseline.median_start_minutes);
        if start_shift > self.config.shift_threshold_minutes {
            anomalies.push(Anomaly::new(user_id, local_date, AnomalyKind::ShiftedStart, start_shift));
        }

        let end_minutes = circular::minutes_of_day(&inference.window.end.with_timezone(&tz));
        let end_shift = circular::circular_distance(end_minutes, baseline.median_end_minutes);
        if end_shift > self.config.shift_threshold_minutes {
            anomalies.push(Anomaly::new(user_id, local_date, AnomalyKind::ShiftedEnd, end_shift));
        }
    }

    /// Short reconnections inside the window whose local start falls in the
    /// nocturnal band. Longer gaps are ordinary wakes, not phone-checking.
    fn check_doomscroll(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        tz: Tz,
        inference: &Inference,
        anomalies: &mut Vec<Anomaly>,
    ) {
        let total: i64 = inference
            .wake_gaps
            .iter()
            .filter(|gap| self.qualifies_as_doomscroll(gap, tz))
            .map(WakeGap::duration_minutes)
            .sum();

        if total > 0 {
            anomalies.push(Anomaly::new(
                user_id,
                local_date,
                AnomalyKind::Doomscroll,
                total as f64,
            ));
        }
    }

    fn qualifies_as_doomscroll(&self, gap: &WakeGap, tz: Tz) -> bool {
        if gap.duration_minutes() > self.config.doomscroll_max_minutes {
            return false;
        }
        let minutes = circular::minutes_of_day(&gap.start.with_timezone(&tz));
        let band_start = f64::from(self.config.doomscroll_band_start_minutes);
        let band_end = f64::from(self.config.doomscroll_band_end_minutes);
        if band_start <= band_end {
            minutes >= band_start && minutes < band_end
        } else {
            minutes >= band_start || minutes < band_end
        }
    }
}
