//! In-memory storage ports for exercising the pass without SQLite.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use noctua_core::{AggregateStore, EventStore};
use noctua_domain::{
    Anomaly, Baseline, EventBatch, NoctuaError, OfflineInterval, PresenceEvent, PresenceStatus,
    Result, SleepWindow, TrackedUser, UserBatch, Watermark,
};

/// In-memory [`EventStore`] seeded with users and events.
///
/// Event ids are assigned in insertion order starting at 1, mirroring the
/// store rowids the watermark cursor advances over.
#[derive(Default)]
pub struct MockEventStore {
    users: Vec<TrackedUser>,
    events: Vec<PresenceEvent>,
    unavailable: bool,
}

impl MockEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: i64, timezone: Option<&str>) -> Self {
        self.users.push(TrackedUser {
            user_id,
            username: Some(format!("user{user_id}")),
            full_name: None,
            timezone: timezone.map(str::to_owned),
        });
        self
    }

    pub fn with_event(mut self, user_id: i64, status: PresenceStatus, ts: &str) -> Self {
        let id = self.events.len() as i64 + 1;
        self.events.push(PresenceEvent {
            id,
            user_id,
            source_event_id: format!("src-{user_id}-{id}"),
            status,
            timestamp: ts.parse().expect("valid RFC3339 timestamp"),
        });
        self
    }

    /// Every call fails as if the store file were gone.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn guard(&self) -> Result<()> {
        if self.unavailable {
            return Err(NoctuaError::Unavailable("event store unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn list_users(&self) -> Result<Vec<TrackedUser>> {
        self.guard()?;
        Ok(self.users.clone())
    }

    async fn events_after(&self, user_id: i64, after_id: i64) -> Result<EventBatch> {
        self.guard()?;
        let mut batch = EventBatch::default();
        for event in self.events.iter().filter(|e| e.user_id == user_id && e.id > after_id) {
            batch.last_event_id = Some(event.id);
            batch.events.push(event.clone());
        }
        Ok(batch)
    }
}

/// In-memory [`AggregateStore`] with the same upsert and write-once
/// semantics as the SQLite store, plus failure injection.
#[derive(Default)]
pub struct MockAggregateStore {
    state: Mutex<StoreState>,
    fail_commits_for: Option<i64>,
    unavailable: bool,
}

#[derive(Default)]
struct StoreState {
    watermarks: HashMap<i64, Watermark>,
    intervals: Vec<OfflineInterval>,
    windows: Vec<SleepWindow>,
    anomalies: Vec<Anomaly>,
    baselines: HashMap<i64, Baseline>,
    commits: u64,
}

impl MockAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a cursor, as if an earlier pass had committed it.
    pub fn with_watermark(self, watermark: Watermark) -> Self {
        self.state.lock().expect("state lock").watermarks.insert(watermark.user_id, watermark);
        self
    }

    /// Commits for this user fail with a non-fatal storage error.
    pub fn failing_commits_for(mut self, user_id: i64) -> Self {
        self.fail_commits_for = Some(user_id);
        self
    }

    /// Every call fails as if the store file were gone.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn watermark_of(&self, user_id: i64) -> Option<Watermark> {
        self.state.lock().expect("state lock").watermarks.get(&user_id).cloned()
    }

    pub fn windows_for(&self, user_id: i64) -> Vec<SleepWindow> {
        let state = self.state.lock().expect("state lock");
        state.windows.iter().filter(|w| w.user_id == user_id).cloned().collect()
    }

    /// Number of successful commits across all users.
    pub fn commit_count(&self) -> u64 {
        self.state.lock().expect("state lock").commits
    }

    fn guard(&self) -> Result<()> {
        if self.unavailable {
            return Err(NoctuaError::Unavailable("aggregate store unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for MockAggregateStore {
    async fn watermark(&self, user_id: i64) -> Result<Option<Watermark>> {
        self.guard()?;
        Ok(self.watermark_of(user_id))
    }

    async fn latest_interval(&self, user_id: i64) -> Result<Option<OfflineInterval>> {
        self.guard()?;
        let state = self.state.lock().expect("state lock");
        Ok(state
            .intervals
            .iter()
            .filter(|interval| interval.user_id == user_id)
            .max_by_key(|interval| interval.end)
            .cloned())
    }

    async fn intervals_overlapping(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OfflineInterval>> {
        self.guard()?;
        let state = self.state.lock().expect("state lock");
        let mut hits: Vec<OfflineInterval> = state
            .intervals
            .iter()
            .filter(|i| i.user_id == user_id && i.start < end && i.end > start)
            .cloned()
            .collect();
        hits.sort_by_key(|interval| interval.start);
        Ok(hits)
    }

    async fn recent_windows(&self, user_id: i64, limit: usize) -> Result<Vec<SleepWindow>> {
        self.guard()?;
        let state = self.state.lock().expect("state lock");
        let mut windows: Vec<SleepWindow> =
            state.windows.iter().filter(|w| w.user_id == user_id).cloned().collect();
        windows.sort_by_key(|window| window.local_date);
        if windows.len() > limit {
            windows.drain(..windows.len() - limit);
        }
        Ok(windows)
    }

    async fn commit_user(&self, batch: UserBatch) -> Result<()> {
        self.guard()?;
        if self.fail_commits_for == Some(batch.user_id) {
            return Err(NoctuaError::Database("commit rejected".into()));
        }

        let mut state = self.state.lock().expect("state lock");
        for interval in batch.intervals {
            match state.intervals.iter_mut().find(|existing| existing.id == interval.id) {
                Some(existing) => *existing = interval,
                None => state.intervals.push(interval),
            }
        }
        for window in batch.windows {
            let taken = state
                .windows
                .iter()
                .any(|w| w.user_id == window.user_id && w.local_date == window.local_date);
            if !taken {
                state.windows.push(window);
            }
        }
        for anomaly in batch.anomalies {
            let taken = state.anomalies.iter().any(|a| {
                a.user_id == anomaly.user_id
                    && a.local_date == anomaly.local_date
                    && a.kind == anomaly.kind
            });
            if !taken {
                state.anomalies.push(anomaly);
            }
        }
        if let Some(baseline) = batch.baseline {
            state.baselines.insert(baseline.user_id, baseline);
        }
        state.watermarks.insert(batch.watermark.user_id, batch.watermark);
        state.commits += 1;
        Ok(())
    }
}
