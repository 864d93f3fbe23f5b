//! Configuration management
//!
//! All tuning parameters the inference algorithms consume live here with
//! their operational defaults; nothing is hard-coded at the use sites.
//! Times-of-day are minutes after local midnight so a single unit covers
//! bounds that straddle midnight (the night window ends on the next day).

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Aggregator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoctuaConfig {
    pub database: DatabaseConfig,
    pub pass: PassConfig,
    pub inference: InferenceConfig,
    pub baseline: BaselineConfig,
    pub anomaly: AnomalyConfig,
    pub users: UserConfig,
}

/// Shared SQLite store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
    /// Per-connection busy timeout; absorbs collector write bursts.
    pub busy_timeout_ms: u64,
    /// Bounded retry for transient contention on the per-user commit.
    pub max_write_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/presence.db".to_string(),
            pool_size: 4,
            busy_timeout_ms: 5000,
            max_write_attempts: 3,
            retry_initial_delay_ms: 100,
        }
    }
}

/// Pass orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    /// Upper bound on users processed concurrently within one pass.
    pub workers: usize,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Interval building and sleep window selection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Reconnections shorter than this are absorbed into the surrounding
    /// offline interval.
    pub merge_gap_minutes: i64,
    /// Intervals below this duration are never sleep candidates.
    pub min_sleep_minutes: i64,
    /// Night window start, minutes after local midnight (1080 = 18:00).
    pub night_window_start_minutes: u32,
    /// Night window end on the FOLLOWING day, minutes after local midnight
    /// (720 = 12:00).
    pub night_window_end_minutes: u32,
    /// Durations at or above this earn the confidence bonus.
    pub long_sleep_minutes: i64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            merge_gap_minutes: 10,
            min_sleep_minutes: 120,
            night_window_start_minutes: 18 * 60,
            night_window_end_minutes: 12 * 60,
            long_sleep_minutes: 6 * 60,
        }
    }
}

impl InferenceConfig {
    pub fn merge_gap(&self) -> Duration {
        Duration::minutes(self.merge_gap_minutes)
    }

    pub fn min_sleep(&self) -> Duration {
        Duration::minutes(self.min_sleep_minutes)
    }
}

/// Rolling baseline parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Number of most recent sleep windows the baseline rolls over.
    pub window_size: usize,
    /// Below this many samples the baseline is insufficient and duration and
    /// shift anomalies are suppressed.
    pub min_samples: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self { window_size: 14, min_samples: 5 }
    }
}

/// Anomaly detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Circular minutes-of-day distance beyond which start/end shifts flag.
    pub shift_threshold_minutes: f64,
    /// Duration deviation flags beyond this multiple of the baseline IQR.
    pub duration_iqr_multiplier: f64,
    /// Floor for the IQR so perfectly regular histories do not flag on
    /// one-minute wobble.
    pub duration_spread_floor_minutes: f64,
    /// Nocturnal band start for doomscroll detection (210 = 03:30 local).
    pub doomscroll_band_start_minutes: u32,
    /// Nocturnal band end for doomscroll detection (360 = 06:00 local).
    pub doomscroll_band_end_minutes: u32,
    /// Wake gaps longer than this are ordinary interruptions, not doomscroll.
    pub doomscroll_max_minutes: i64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            shift_threshold_minutes: 90.0,
            duration_iqr_multiplier: 1.5,
            duration_spread_floor_minutes: 15.0,
            doomscroll_band_start_minutes: 3 * 60 + 30,
            doomscroll_band_end_minutes: 6 * 60,
            doomscroll_max_minutes: 20,
        }
    }
}

/// Per-user settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// IANA timezone overrides keyed by user id (string-keyed so the map
    /// deserializes from TOML tables and env lists alike).
    pub timezones: HashMap<String, String>,
    /// Fallback when neither an override nor a collector-recorded timezone
    /// exists; `None` means such users are skipped.
    pub default_timezone: Option<String>,
}

impl UserConfig {
    /// Configured timezone override for a user, if any.
    pub fn timezone_override(&self, user_id: i64) -> Option<&str> {
        self.timezones.get(&user_id.to_string()).map(String::as_str)
    }
}
