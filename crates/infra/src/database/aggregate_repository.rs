//! Repository over the aggregator-owned tables.
//!
//! All derived rows for one user land in a single transaction together with
//! the watermark advance, so a crash or a lost race with the collector can
//! never leave the cursor ahead of (or behind) the rows it accounts for.
//! Windows and anomalies are write-once under their unique keys; replaying
//! the same batch is a no-op.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use noctua_core::AggregateStore;
use noctua_domain::{
    Anomaly, Baseline, NoctuaError, OfflineInterval, OpenInterval, Result as DomainResult,
    SleepWindow, UserBatch, WakeGap, Watermark,
};
use rusqlite::{params, Connection, Row, Transaction};
use tokio::task;

use super::manager::DbManager;
use super::retry::RetryPolicy;
use crate::errors::InfraError;

/// SQLite-backed implementation of [`AggregateStore`].
pub struct SqliteAggregateStore {
    db: Arc<DbManager>,
    retry: RetryPolicy,
}

impl SqliteAggregateStore {
    /// Create a new repository instance.
    pub fn new(db: Arc<DbManager>, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }
}

#[async_trait]
impl AggregateStore for SqliteAggregateStore {
    async fn watermark(&self, user_id: i64) -> DomainResult<Option<Watermark>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<Watermark>> {
            let conn = db.get_connection()?;

            let result = conn.query_row(
                "SELECT user_id, last_event_id, last_event_ts, open_started_at,
                        open_start_approximated, open_wake_gaps_json, open_resumed_id,
                        last_closed_date
                 FROM watermarks WHERE user_id = ?1",
                params![user_id],
                map_watermark_row,
            );

            match result {
                Ok(watermark) => Ok(Some(watermark)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(err) => Err(map_sql_error(err)),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn latest_interval(&self, user_id: i64) -> DomainResult<Option<OfflineInterval>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<OfflineInterval>> {
            let conn = db.get_connection()?;

            let result = conn.query_row(
                "SELECT id, user_id, start_ts, end_ts, start_approximated, wake_gaps_json
                 FROM offline_intervals
                 WHERE user_id = ?1
                 ORDER BY end_ts DESC
                 LIMIT 1",
                params![user_id],
                map_interval_row,
            );

            match result {
                Ok(interval) => Ok(Some(interval)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(err) => Err(map_sql_error(err)),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn intervals_overlapping(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<OfflineInterval>> {
        let db = Arc::clone(&self.db);
        let (start_ts, end_ts) = (start.timestamp(), end.timestamp());

        task::spawn_blocking(move || -> DomainResult<Vec<OfflineInterval>> {
            let conn = db.get_connection()?;
            query_intervals_overlapping(&conn, user_id, start_ts, end_ts).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn recent_windows(&self, user_id: i64, limit: usize) -> DomainResult<Vec<SleepWindow>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<SleepWindow>> {
            let conn = db.get_connection()?;
            query_recent_windows(&conn, user_id, limit as i64).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn commit_user(&self, batch: UserBatch) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let batch = Arc::new(batch);

        self.retry
            .run(|| {
                let db = Arc::clone(&db);
                let batch = Arc::clone(&batch);
                async move {
                    task::spawn_blocking(move || -> DomainResult<()> {
                        let mut conn = db.get_connection()?;
                        commit_user_tx(&mut conn, &batch)
                    })
                    .await
                    .map_err(map_join_error)?
                }
            })
            .await
    }
}

// =============================================================================
// Write Path
// =============================================================================

fn commit_user_tx(conn: &mut Connection, batch: &UserBatch) -> DomainResult<()> {
    let now = Utc::now().timestamp();
    let tx = conn.transaction().map_err(map_sql_error)?;

    for interval in &batch.intervals {
        upsert_interval(&tx, interval, now)?;
    }
    for window in &batch.windows {
        insert_window(&tx, window, now)?;
    }
    for anomaly in &batch.anomalies {
        insert_anomaly(&tx, anomaly, now)?;
    }
    if let Some(baseline) = &batch.baseline {
        upsert_baseline(&tx, baseline, now)?;
    }
    upsert_watermark(&tx, &batch.watermark, now)?;

    tx.commit().map_err(map_sql_error)
}

/// Insert or extend an interval. A resumed interval re-emits its stored id,
/// so the conflict arm rewrites the row in place; `created_at` keeps the
/// original insertion time.
fn upsert_interval(
    tx: &Transaction<'_>,
    interval: &OfflineInterval,
    now: i64,
) -> DomainResult<()> {
    let wake_gaps_json = encode_wake_gaps(&interval.wake_gaps)?;
    tx.execute(
        "INSERT INTO offline_intervals
             (id, user_id, start_ts, end_ts, start_approximated, wake_gaps_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             start_ts = excluded.start_ts,
             end_ts = excluded.end_ts,
             start_approximated = excluded.start_approximated,
             wake_gaps_json = excluded.wake_gaps_json",
        params![
            interval.id,
            interval.user_id,
            interval.start.timestamp(),
            interval.end.timestamp(),
            interval.start_approximated,
            wake_gaps_json,
            now
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn insert_window(tx: &Transaction<'_>, window: &SleepWindow, now: i64) -> DomainResult<()> {
    tx.execute(
        "INSERT OR IGNORE INTO sleep_windows
             (id, user_id, local_date, start_ts, end_ts, confidence, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            window.id,
            window.user_id,
            window.local_date.to_string(),
            window.start.timestamp(),
            window.end.timestamp(),
            window.confidence,
            now
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn insert_anomaly(tx: &Transaction<'_>, anomaly: &Anomaly, now: i64) -> DomainResult<()> {
    tx.execute(
        "INSERT OR IGNORE INTO anomalies (id, user_id, local_date, kind, magnitude, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            anomaly.id,
            anomaly.user_id,
            anomaly.local_date.to_string(),
            anomaly.kind.to_string(),
            anomaly.magnitude,
            now
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn upsert_baseline(tx: &Transaction<'_>, baseline: &Baseline, now: i64) -> DomainResult<()> {
    tx.execute(
        "INSERT INTO baselines
             (user_id, median_start_minutes, median_end_minutes, median_duration_minutes,
              duration_spread_minutes, sample_count, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
             median_start_minutes = excluded.median_start_minutes,
             median_end_minutes = excluded.median_end_minutes,
             median_duration_minutes = excluded.median_duration_minutes,
             duration_spread_minutes = excluded.duration_spread_minutes,
             sample_count = excluded.sample_count,
             updated_at = excluded.updated_at",
        params![
            baseline.user_id,
            baseline.median_start_minutes,
            baseline.median_end_minutes,
            baseline.median_duration_minutes,
            baseline.duration_spread_minutes,
            baseline.sample_count,
            now
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn upsert_watermark(tx: &Transaction<'_>, watermark: &Watermark, now: i64) -> DomainResult<()> {
    let open = watermark.open_interval.as_ref();
    let open_wake_gaps_json = match open {
        Some(interval) => encode_wake_gaps(&interval.wake_gaps)?,
        None => None,
    };
    tx.execute(
        "INSERT INTO watermarks
             (user_id, last_event_id, last_event_ts, open_started_at,
              open_start_approximated, open_wake_gaps_json, open_resumed_id,
              last_closed_date, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(user_id) DO UPDATE SET
             last_event_id = excluded.last_event_id,
             last_event_ts = excluded.last_event_ts,
             open_started_at = excluded.open_started_at,
             open_start_approximated = excluded.open_start_approximated,
             open_wake_gaps_json = excluded.open_wake_gaps_json,
             open_resumed_id = excluded.open_resumed_id,
             last_closed_date = excluded.last_closed_date,
             updated_at = excluded.updated_at",
        params![
            watermark.user_id,
            watermark.last_event_id,
            watermark.last_event_ts.map(|ts| ts.timestamp()),
            open.map(|interval| interval.start.timestamp()),
            open.is_some_and(|interval| interval.start_approximated),
            open_wake_gaps_json,
            open.and_then(|interval| interval.resumed_id.clone()),
            watermark.last_closed_date.map(|date| date.to_string()),
            now
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

// =============================================================================
// Read Helpers
// =============================================================================

fn query_intervals_overlapping(
    conn: &Connection,
    user_id: i64,
    start_ts: i64,
    end_ts: i64,
) -> rusqlite::Result<Vec<OfflineInterval>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, start_ts, end_ts, start_approximated, wake_gaps_json
         FROM offline_intervals
         WHERE user_id = ?1 AND start_ts < ?3 AND end_ts > ?2
         ORDER BY start_ts ASC",
    )?;
    let rows = stmt.query_map(params![user_id, start_ts, end_ts], map_interval_row)?;
    rows.collect()
}

/// The `limit` most recent windows by local date, re-sorted oldest first so
/// rolling baselines can be replayed in order.
fn query_recent_windows(
    conn: &Connection,
    user_id: i64,
    limit: i64,
) -> rusqlite::Result<Vec<SleepWindow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, local_date, start_ts, end_ts, confidence FROM (
             SELECT id, user_id, local_date, start_ts, end_ts, confidence
             FROM sleep_windows
             WHERE user_id = ?1
             ORDER BY local_date DESC
             LIMIT ?2
         ) ORDER BY local_date ASC",
    )?;
    let rows = stmt.query_map(params![user_id, limit], map_window_row)?;
    rows.collect()
}

fn map_interval_row(row: &Row<'_>) -> rusqlite::Result<OfflineInterval> {
    Ok(OfflineInterval {
        id: row.get(0)?,
        user_id: row.get(1)?,
        start: datetime_column(2, row.get(2)?)?,
        end: datetime_column(3, row.get(3)?)?,
        start_approximated: row.get(4)?,
        wake_gaps: decode_wake_gaps(5, row.get(5)?)?,
    })
}

fn map_window_row(row: &Row<'_>) -> rusqlite::Result<SleepWindow> {
    let local_date: String = row.get(2)?;
    Ok(SleepWindow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        local_date: date_column(2, &local_date)?,
        start: datetime_column(3, row.get(3)?)?,
        end: datetime_column(4, row.get(4)?)?,
        confidence: row.get(5)?,
    })
}

fn map_watermark_row(row: &Row<'_>) -> rusqlite::Result<Watermark> {
    let open_interval = match row.get::<_, Option<i64>>(3)? {
        None => None,
        Some(started_at) => Some(OpenInterval {
            start: datetime_column(3, started_at)?,
            start_approximated: row.get(4)?,
            wake_gaps: decode_wake_gaps(5, row.get(5)?)?,
            resumed_id: row.get(6)?,
        }),
    };
    let last_event_ts = match row.get::<_, Option<i64>>(2)? {
        None => None,
        Some(secs) => Some(datetime_column(2, secs)?),
    };
    let last_closed_date = match row.get::<_, Option<String>>(7)? {
        None => None,
        Some(text) => Some(date_column(7, &text)?),
    };

    Ok(Watermark {
        user_id: row.get(0)?,
        last_event_id: row.get(1)?,
        last_event_ts,
        open_interval,
        last_closed_date,
    })
}

fn datetime_column(idx: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("timestamp {secs} out of range").into(),
        )
    })
}

fn date_column(idx: usize, text: &str) -> rusqlite::Result<NaiveDate> {
    text.parse().map_err(|err: chrono::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn encode_wake_gaps(gaps: &[WakeGap]) -> DomainResult<Option<String>> {
    if gaps.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(gaps)
        .map(Some)
        .map_err(|err| NoctuaError::Internal(format!("serialize wake gaps: {err}")))
}

fn decode_wake_gaps(idx: usize, json: Option<String>) -> rusqlite::Result<Vec<WakeGap>> {
    match json {
        None => Ok(Vec::new()),
        Some(text) => serde_json::from_str(&text).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        }),
    }
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
