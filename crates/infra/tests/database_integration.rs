//! End-to-end storage coverage for the SQLite event and aggregate stores.
//!
//! These tests exercise the full port workflows against the real shared
//! schema: cursor-ordered event reads, atomic per-user commits, replay
//! idempotence, and the open-interval carry-over on the watermark row. Each
//! test runs on an isolated database file with migrations applied.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use noctua_core::{AggregateStore, EventStore};
use noctua_domain::{
    Anomaly, AnomalyKind, Baseline, OfflineInterval, OpenInterval, PresenceStatus, SleepWindow,
    UserBatch, WakeGap, Watermark,
};
use noctua_infra::database::{RetryPolicy, SqliteAggregateStore, SqliteEventStore};
use support::{ts, TestDatabase};
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread")]
async fn event_store_streams_users_and_cursor_ordered_events() {
    let db = TestDatabase::new();
    db.seed_user(101, "lys", Some("Europe/Kyiv"));
    db.seed_user(102, "anzu", None);

    let first_id = db.seed_event(101, "offline", ts("2024-10-01T22:00:00Z"));
    db.seed_event(101, "online", ts("2024-10-02T06:30:00Z"));
    db.seed_event(101, "away", ts("2024-10-02T07:00:00Z")); // not a collector status
    let last_id = db.seed_event(101, "offline", ts("2024-10-02T23:00:00Z"));
    db.seed_event(102, "recently_active", ts("2024-10-02T10:00:00Z"));

    let store = SqliteEventStore::new(Arc::clone(&db.manager));

    let users = store.list_users().await.expect("users should list");
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].user_id, 101);
    assert_eq!(users[0].timezone.as_deref(), Some("Europe/Kyiv"));
    assert!(users[1].timezone.is_none());

    let batch = store.events_after(101, 0).await.expect("events should read");
    assert_eq!(batch.events.len(), 3, "the malformed status row is dropped");
    assert_eq!(batch.skipped, 1);
    assert_eq!(batch.last_event_id, Some(last_id), "skipped rows still advance the cursor");
    assert_eq!(batch.events[0].status, PresenceStatus::Offline);
    assert!(batch.events.windows(2).all(|pair| pair[0].id < pair[1].id));

    let resumed = store.events_after(101, first_id).await.expect("resumed read should work");
    assert_eq!(resumed.events.len(), 2, "consumed events are not re-read");

    let other = store.events_after(102, 0).await.expect("other user should read");
    assert_eq!(other.events.len(), 1);
    assert_eq!(other.events[0].status, PresenceStatus::RecentlyActive);
}

#[tokio::test(flavor = "multi_thread")]
async fn commit_roundtrip_and_replay_is_idempotent() {
    let db = TestDatabase::new();
    db.seed_user(7, "mira", Some("Europe/Kyiv"));
    let store = aggregate_store(&db);

    let date = local_date(2024, 10, 1);
    let mut interval = OfflineInterval::new(7, ts("2024-10-01T22:00:00Z"), ts("2024-10-02T06:30:00Z"));
    interval.wake_gaps.push(WakeGap {
        start: ts("2024-10-02T03:40:00Z"),
        end: ts("2024-10-02T03:48:00Z"),
    });
    let window =
        SleepWindow::new(7, date, ts("2024-10-01T22:00:00Z"), ts("2024-10-02T06:30:00Z"), 0.87);
    let anomaly = Anomaly::new(7, date, AnomalyKind::Doomscroll, 8.0);
    let baseline = Baseline {
        user_id: 7,
        median_start_minutes: 1320.0,
        median_end_minutes: 390.0,
        median_duration_minutes: 510.0,
        duration_spread_minutes: 22.0,
        sample_count: 6,
    };
    let watermark = Watermark {
        user_id: 7,
        last_event_id: 42,
        last_event_ts: Some(ts("2024-10-02T06:30:00Z")),
        open_interval: None,
        last_closed_date: Some(date),
    };

    let batch = UserBatch {
        user_id: 7,
        intervals: vec![interval.clone()],
        windows: vec![window.clone()],
        anomalies: vec![anomaly.clone()],
        baseline: Some(baseline.clone()),
        watermark: watermark.clone(),
    };

    store.commit_user(batch.clone()).await.expect("first commit should succeed");
    store.commit_user(batch).await.expect("replay should be a no-op");

    assert_eq!(db.count_rows("offline_intervals", 7), 1);
    assert_eq!(db.count_rows("sleep_windows", 7), 1);
    assert_eq!(db.count_rows("anomalies", 7), 1);

    let stored_wm = store.watermark(7).await.expect("watermark read").expect("watermark present");
    assert_eq!(stored_wm, watermark);

    let latest = store.latest_interval(7).await.expect("latest read").expect("interval present");
    assert_eq!(latest, interval);

    let windows = store.recent_windows(7, 5).await.expect("windows read");
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].id, window.id);
    assert!((windows[0].confidence - 0.87).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread")]
async fn open_interval_carries_across_commits() {
    let db = TestDatabase::new();
    db.seed_user(9, "noor", Some("America/New_York"));
    let store = aggregate_store(&db);

    let resumed_id = Uuid::now_v7().to_string();
    let open = OpenInterval {
        start: ts("2024-10-03T23:10:00Z"),
        start_approximated: true,
        wake_gaps: vec![WakeGap {
            start: ts("2024-10-04T01:00:00Z"),
            end: ts("2024-10-04T01:06:00Z"),
        }],
        resumed_id: Some(resumed_id.clone()),
    };
    let watermark = Watermark {
        user_id: 9,
        last_event_id: 10,
        last_event_ts: Some(ts("2024-10-04T01:06:00Z")),
        open_interval: Some(open.clone()),
        last_closed_date: None,
    };

    store
        .commit_user(UserBatch {
            user_id: 9,
            intervals: Vec::new(),
            windows: Vec::new(),
            anomalies: Vec::new(),
            baseline: None,
            watermark,
        })
        .await
        .expect("commit with open interval should succeed");

    let stored = store.watermark(9).await.expect("watermark read").expect("watermark present");
    let carried = stored.open_interval.expect("open interval should round-trip");
    assert_eq!(carried, open, "start, flag, gaps, and resumed id all survive");

    // Next pass closes the carried interval under the resumed id.
    let closed = carried.close(9, ts("2024-10-04T07:00:00Z"));
    assert_eq!(closed.id, resumed_id);
    let next_watermark = Watermark {
        user_id: 9,
        last_event_id: 11,
        last_event_ts: Some(ts("2024-10-04T07:00:00Z")),
        open_interval: None,
        last_closed_date: None,
    };
    store
        .commit_user(UserBatch {
            user_id: 9,
            intervals: vec![closed],
            windows: Vec::new(),
            anomalies: Vec::new(),
            baseline: None,
            watermark: next_watermark,
        })
        .await
        .expect("closing commit should succeed");

    let after = store.watermark(9).await.expect("watermark read").expect("watermark present");
    assert!(after.open_interval.is_none(), "closed interval leaves the watermark");
    assert_eq!(db.count_rows("offline_intervals", 9), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn resumed_interval_extends_stored_row_in_place() {
    let db = TestDatabase::new();
    db.seed_user(4, "teo", None);
    let store = aggregate_store(&db);

    let interval = OfflineInterval::new(4, ts("2024-10-01T22:00:00Z"), ts("2024-10-02T06:00:00Z"));
    let original_id = interval.id.clone();
    store
        .commit_user(batch_with_interval(4, interval.clone(), 5))
        .await
        .expect("initial commit should succeed");

    // A reconnection 4 minutes after the stored end reopens the interval.
    let reopened = OpenInterval::resume(interval, ts("2024-10-02T06:04:00Z"));
    let extended = reopened.close(4, ts("2024-10-02T07:30:00Z"));
    store
        .commit_user(batch_with_interval(4, extended, 6))
        .await
        .expect("extension commit should succeed");

    assert_eq!(db.count_rows("offline_intervals", 4), 1, "the stored row is overwritten");
    let latest = store.latest_interval(4).await.expect("latest read").expect("interval present");
    assert_eq!(latest.id, original_id);
    assert_eq!(latest.end, ts("2024-10-02T07:30:00Z"));
    assert_eq!(latest.wake_gaps.len(), 1);
    assert_eq!(latest.wake_gaps[0].duration_minutes(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_commits_for_distinct_users_both_land() {
    let db = TestDatabase::new();
    db.seed_user(21, "ana", None);
    db.seed_user(22, "bo", None);
    let store = Arc::new(aggregate_store(&db));

    let first = {
        let store = Arc::clone(&store);
        let interval =
            OfflineInterval::new(21, ts("2024-10-01T22:00:00Z"), ts("2024-10-02T06:00:00Z"));
        tokio::spawn(async move { store.commit_user(batch_with_interval(21, interval, 3)).await })
    };
    let second = {
        let store = Arc::clone(&store);
        let interval =
            OfflineInterval::new(22, ts("2024-10-01T23:00:00Z"), ts("2024-10-02T07:00:00Z"));
        tokio::spawn(async move { store.commit_user(batch_with_interval(22, interval, 4)).await })
    };

    first.await.expect("task should join").expect("first commit should succeed");
    second.await.expect("task should join").expect("second commit should succeed");

    assert_eq!(db.count_rows("offline_intervals", 21), 1);
    assert_eq!(db.count_rows("offline_intervals", 22), 1);
    assert!(store.watermark(21).await.expect("read").is_some());
    assert!(store.watermark(22).await.expect("read").is_some());
}

// === Helper Functions ===

fn aggregate_store(db: &TestDatabase) -> SqliteAggregateStore {
    SqliteAggregateStore::new(
        Arc::clone(&db.manager),
        RetryPolicy::new(3, Duration::from_millis(10)),
    )
}

fn batch_with_interval(user_id: i64, interval: OfflineInterval, last_event_id: i64) -> UserBatch {
    let watermark = Watermark {
        user_id,
        last_event_id,
        last_event_ts: Some(interval.end),
        open_interval: None,
        last_closed_date: None,
    };
    UserBatch {
        user_id,
        intervals: vec![interval],
        windows: Vec::new(),
        anomalies: Vec::new(),
        baseline: None,
        watermark,
    }
}

fn local_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
}
