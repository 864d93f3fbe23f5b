//! Chooses the nightly sleep window among a date's offline intervals.

use std::cmp::Ordering;

use chrono::Duration;
use chrono_tz::Tz;
use noctua_domain::{InferenceConfig, OfflineInterval, SleepWindow, WakeGap};

use super::night::NightWindow;

/// A chosen sleep window together with the evidence behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub window: SleepWindow,
    /// Wake gaps absorbed into the chosen interval; anomaly detection reads
    /// these for nocturnal activity.
    pub wake_gaps: Vec<WakeGap>,
}

/// Selects at most one sleep window per local date.
///
/// Candidates are intervals overlapping the date's night window with a
/// duration of at least the minimum sleep; the largest overlap wins, ties
/// broken by longer duration, then earlier start. The window keeps the
/// interval's real bounds, unclipped: sleep that starts before the window
/// opens is still that night's sleep.
pub struct WindowInferencer {
    config: InferenceConfig,
}

impl WindowInferencer {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    /// Infer the sleep window for `date`, if any interval qualifies.
    pub fn infer(
        &self,
        user_id: i64,
        date: chrono::NaiveDate,
        tz: Tz,
        intervals: &[OfflineInterval],
    ) -> Option<Inference> {
        let night = NightWindow::for_date(date, tz, &self.config);
        let min_sleep = self.config.min_sleep();

        let mut best: Option<(&OfflineInterval, Duration)> = None;
        for interval in intervals {
            if interval.duration() < min_sleep {
                continue;
            }
            let overlap = night.overlap(interval.start, interval.end);
            if overlap <= Duration::zero() {
                continue;
            }
            best = Some(match best {
                None => (interval, overlap),
                Some(current) => pick(current, (interval, overlap)),
            });
        }

        let (chosen, overlap) = best?;
        let confidence = self.confidence(chosen, overlap);
        Some(Inference {
            window: SleepWindow::new(user_id, date, chosen.start, chosen.end, confidence),
            wake_gaps: chosen.wake_gaps.clone(),
        })
    }

    /// Confidence in [0, 1], rounded to two decimals: 0.4 base, up to 0.5
    /// for the fraction of the interval inside the night window, 0.1 bonus
    /// for a full night's length, 0.2 penalty for an approximated start.
    fn confidence(&self, interval: &OfflineInterval, overlap: Duration) -> f64 {
        let duration_secs = interval.duration().num_seconds();
        let overlap_fraction = if duration_secs > 0 {
            overlap.num_seconds() as f64 / duration_secs as f64
        } else {
            0.0
        };

        let long_bonus = if interval.duration() >= Duration::minutes(self.config.long_sleep_minutes)
        {
            0.1
        } else {
            0.0
        };
        let approx_penalty = if interval.start_approximated { 0.2 } else { 0.0 };

        let score = 0.4 + 0.5 * overlap_fraction + long_bonus - approx_penalty;
        (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
    }
}

/// Keep the better of two candidates.
fn pick<'a>(
    current: (&'a OfflineInterval, Duration),
    challenger: (&'a OfflineInterval, Duration),
) -> (&'a OfflineInterval, Duration) {
    let ordering = challenger
        .1
        .cmp(&current.1)
        .then_with(|| challenger.0.duration().cmp(&current.0.duration()))
        .then_with(|| current.0.start.cmp(&challenger.0.start));
    if ordering == Ordering::Greater {
        challenger
    } else {
        current
    }
}
