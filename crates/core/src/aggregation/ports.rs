//! Storage ports the aggregation pass drives.
//!
//! Two traits split along table ownership: the collector owns users and
//! presence events (read-only here), the aggregator owns everything derived.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use noctua_domain::{
    EventBatch, OfflineInterval, Result, SleepWindow, TrackedUser, UserBatch, Watermark,
};

/// Read access to the collector-owned tables.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Every user the collector tracks.
    async fn list_users(&self) -> Result<Vec<TrackedUser>>;

    /// Events for a user with store rowid greater than `after_id`, in rowid
    /// order. Rows that fail status normalization are dropped and counted
    /// on the batch.
    async fn events_after(&self, user_id: i64, after_id: i64) -> Result<EventBatch>;
}

/// Read/write access to the aggregator-owned tables.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    async fn watermark(&self, user_id: i64) -> Result<Option<Watermark>>;

    /// The user's most recently closed interval, consulted for cross-pass
    /// gap merging.
    async fn latest_interval(&self, user_id: i64) -> Result<Option<OfflineInterval>>;

    /// Closed intervals intersecting `[start, end)`, ordered by start.
    async fn intervals_overlapping(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OfflineInterval>>;

    /// Up to `limit` most recent sleep windows, returned oldest first.
    async fn recent_windows(&self, user_id: i64, limit: usize) -> Result<Vec<SleepWindow>>;

    /// Persist one user's derived rows and watermark atomically. Either
    /// everything lands or nothing does.
    async fn commit_user(&self, batch: UserBatch) -> Result<()>;
}
