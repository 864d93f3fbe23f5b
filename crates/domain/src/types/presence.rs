//! Presence input types shared with the external collector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized presence status as stored in the event store
///
/// The collector normalizes raw platform statuses into this set; anything
/// else in the status column is skipped as an ingestion error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
    RecentlyActive,
}

crate::impl_status_conversions!(PresenceStatus {
    Online => "online",
    Offline => "offline",
    RecentlyActive => "recently_active"
});

impl PresenceStatus {
    /// Statuses that close an open offline interval.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Online | Self::RecentlyActive)
    }
}

/// A single presence transition read from the event store
///
/// Append-only and collector-owned; `id` is the store rowid the watermark
/// cursor advances over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub id: i64,
    pub user_id: i64,
    pub source_event_id: String,
    pub status: PresenceStatus,
    pub timestamp: DateTime<Utc>,
}

/// A user registered by the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedUser {
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
    /// IANA timezone recorded by the collector; config overrides win.
    pub timezone: Option<String>,
}

/// One fetch of unconsumed events for a user
///
/// Rows whose status column failed normalization are dropped before the
/// batch is built; they still advance `last_event_id` so they are never
/// re-read, and `skipped` accounts for them.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Vec<PresenceEvent>,
    pub skipped: u64,
    /// Highest store rowid scanned, including skipped rows.
    pub last_event_id: Option<i64>,
}
