//! Rolling per-user sleep baselines.
//!
//! Tracks the last N inferred windows and summarizes them with medians:
//! circular minutes-of-day for start and end (schedules straddle midnight),
//! plain medians and interquartile range for duration. Medians keep one
//! erratic night from dragging the whole baseline.

use std::collections::VecDeque;

use chrono_tz::Tz;
use noctua_domain::{Baseline, BaselineConfig, SleepWindow};

use crate::circular;

#[derive(Debug, Clone, Copy)]
struct Sample {
    start_minutes: f64,
    end_minutes: f64,
    duration_minutes: f64,
}

/// Rolling window of recent sleep observations for one user.
#[derive(Debug)]
pub struct BaselineTracker {
    user_id: i64,
    tz: Tz,
    window_size: usize,
    samples: VecDeque<Sample>,
}

impl BaselineTracker {
    /// Start a tracker pre-loaded with the user's stored windows, oldest
    /// first. Only the newest `window_size` of them are retained.
    pub fn seed(user_id: i64, tz: Tz, config: &BaselineConfig, history: &[SleepWindow]) -> Self {
        let window_size = config.window_size.max(1);
        let mut tracker = Self {
            user_id,
            tz,
            window_size,
            samples: VecDeque::with_capacity(window_size),
        };
        for window in history {
            tracker.observe(window);
        }
        tracker
    }

    /// Fold one inferred window into the rolling set.
    pub fn observe(&mut self, window: &SleepWindow) {
        let sample = Sample {
            start_minutes: circular::minutes_of_day(&window.start.with_timezone(&self.tz)),
            end_minutes: circular::minutes_of_day(&window.end.with_timezone(&self.tz)),
            duration_minutes: window.duration_minutes() as f64,
        };
        self.samples.push_back(sample);
        while self.samples.len() > self.window_size {
            self.samples.pop_front();
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Current baseline row, or `None` before the first observation.
    pub fn snapshot(&self) -> Option<Baseline> {
        if self.samples.is_empty() {
            return None;
        }

        let starts: Vec<f64> = self.samples.iter().map(|s| s.start_minutes).collect();
        let ends: Vec<f64> = self.samples.iter().map(|s| s.end_minutes).collect();
        let durations: Vec<f64> = self.samples.iter().map(|s| s.duration_minutes).collect();

        Some(Baseline {
            user_id: self.user_id,
            median_start_minutes: circular::circular_median(&starts)?,
            median_end_minutes: circular::circular_median(&ends)?,
            median_duration_minutes: circular::median(&durations)?,
            duration_spread_minutes: circular::interquartile_range(&durations)?,
            sample_count: self.samples.len() as i64,
        })
    }
}
