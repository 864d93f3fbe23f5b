//! Shared helpers for infra integration tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use noctua_domain::DatabaseConfig;
use noctua_infra::database::DbManager;
use tempfile::TempDir;

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with migrations applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, &DatabaseConfig::default())
            .expect("db manager should be created");
        manager.run_migrations().expect("schema migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    /// Execute a batch of SQL statements against the database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }

    /// Register a tracked user the way the collector would.
    pub fn seed_user(&self, user_id: i64, username: &str, timezone: Option<&str>) {
        let conn = self.manager.get_connection().expect("connection for seed_user");
        conn.execute(
            "INSERT INTO users (user_id, username, full_name, timezone) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, username, format!("{username} (test)"), timezone],
        )
        .expect("user row should insert");
    }

    /// Append a presence event and return its store rowid.
    pub fn seed_event(&self, user_id: i64, status: &str, ts: DateTime<Utc>) -> i64 {
        let conn = self.manager.get_connection().expect("connection for seed_event");
        conn.execute(
            "INSERT INTO presence_events (user_id, source_event_id, status, raw_status, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                user_id,
                format!("src-{user_id}-{}", ts.timestamp()),
                status,
                status.to_uppercase(),
                ts.timestamp()
            ],
        )
        .expect("event row should insert");
        conn.last_insert_rowid()
    }

    /// Count rows in a table for one user.
    pub fn count_rows(&self, table: &str, user_id: i64) -> i64 {
        let conn = self.manager.get_connection().expect("connection for count_rows");
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE user_id = ?1"),
            [user_id],
            |row| row.get(0),
        )
        .expect("count query should succeed")
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an RFC3339 timestamp for fixture data.
pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid RFC3339 timestamp")
}
