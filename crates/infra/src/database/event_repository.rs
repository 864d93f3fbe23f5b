//! Read-side repository over the collector-owned tables.
//!
//! The aggregator never writes `users` or `presence_events`; it reads them
//! in watermark order. Status normalization failures never fail a fetch:
//! bad rows are skipped, counted, and still advance the cursor so they are
//! read exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use noctua_core::EventStore;
use noctua_domain::{
    EventBatch, NoctuaError, PresenceEvent, PresenceStatus, Result as DomainResult, TrackedUser,
};
use rusqlite::{params, Connection, Row};
use tokio::task;
use tracing::warn;

use super::manager::DbManager;
use crate::errors::InfraError;

/// SQLite-backed implementation of [`EventStore`].
pub struct SqliteEventStore {
    db: Arc<DbManager>,
}

impl SqliteEventStore {
    /// Create a new repository instance.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn list_users(&self) -> DomainResult<Vec<TrackedUser>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<TrackedUser>> {
            let conn = db.get_connection()?;
            query_users(&conn).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn events_after(&self, user_id: i64, after_id: i64) -> DomainResult<EventBatch> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<EventBatch> {
            let conn = db.get_connection()?;
            query_events_after(&conn, user_id, after_id).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Map a row to a TrackedUser
fn map_user_row(row: &Row<'_>) -> rusqlite::Result<TrackedUser> {
    Ok(TrackedUser {
        user_id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        timezone: row.get(3)?,
    })
}

fn query_users(conn: &Connection) -> rusqlite::Result<Vec<TrackedUser>> {
    let mut stmt =
        conn.prepare("SELECT user_id, username, full_name, timezone FROM users ORDER BY user_id")?;
    let rows = stmt.query_map([], map_user_row)?;
    rows.collect()
}

/// Fetch events strictly after the cursor, normalizing the status column.
///
/// The collector also stores the raw platform status; only the normalized
/// column is consulted here.
fn query_events_after(
    conn: &Connection,
    user_id: i64,
    after_id: i64,
) -> rusqlite::Result<EventBatch> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, source_event_id, status, timestamp
         FROM presence_events
         WHERE user_id = ?1 AND id > ?2
         ORDER BY id ASC",
    )?;

    let mut batch = EventBatch::default();
    let mut rows = stmt.query(params![user_id, after_id])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        batch.last_event_id = Some(id);

        let status_text: String = row.get(3)?;
        let Ok(status) = status_text.parse::<PresenceStatus>() else {
            warn!(user_id, event_id = id, status = %status_text, "unknown status, skipping event");
            batch.skipped += 1;
            continue;
        };

        let timestamp_secs: i64 = row.get(4)?;
        let Some(timestamp) = DateTime::<Utc>::from_timestamp(timestamp_secs, 0) else {
            warn!(
                user_id,
                event_id = id,
                timestamp = timestamp_secs,
                "timestamp out of range, skipping event"
            );
            batch.skipped += 1;
            continue;
        };

        batch.events.push(PresenceEvent {
            id,
            user_id: row.get(1)?,
            source_event_id: row.get(2)?,
            status,
            timestamp,
        });
    }
    Ok(batch)
}

// =============================================================================
// Error Mapping
// =============================================================================

fn map_sql_error(err: rusqlite::Error) -> NoctuaError {
    NoctuaError::from(InfraError::from(err))
}

fn map_join_error(err: task::JoinError) -> NoctuaError {
    NoctuaError::Internal(format!("task join error: {err}"))
}

// =============================================================================
// Tests
// =============================================================================
