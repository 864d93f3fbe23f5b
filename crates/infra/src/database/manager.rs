//! Database connection manager backed by an r2d2 SQLite pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use noctua_domain::{DatabaseConfig, NoctuaError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;

use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Pooled connection handle the repositories work with.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager that wraps an r2d2 pool over the shared SQLite file.
///
/// The file is co-written by the external collector, so every connection
/// gets WAL mode and a busy timeout; contention shows up as retryable
/// errors rather than blocking forever.
pub struct DbManager {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl DbManager {
    /// Create a new manager with the pool sized from the config.
    pub fn new<P: AsRef<Path>>(db_path: P, config: &DatabaseConfig) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    NoctuaError::Unavailable(format!(
                        "cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let pool_size = config.pool_size.max(1);
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(&path)
            .with_init(move |conn| apply_connection_pragmas(conn, busy_timeout));

        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| NoctuaError::Unavailable(format!("cannot open database pool: {e}")))?;

        info!(db_path = %path.display(), max_connections = pool_size, "sqlite pool initialised");

        Ok(Self { pool, path })
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<PooledConnection> {
        self.pool.get().map_err(map_pool_error)
    }

    /// Ensure the full shared schema exists on the current database.
    ///
    /// Gated on `PRAGMA user_version` so reruns against an up-to-date store
    /// are no-ops; the collector applies the same contract on its side.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        create_schema(&conn)?;
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the store answers a trivial query.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0)).map_err(map_sql_error)?;
        Ok(())
    }
}

fn apply_connection_pragmas(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA wal_autocheckpoint=1000;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;",
    )?;
    conn.busy_timeout(busy_timeout)
}

fn create_schema(conn: &Connection) -> Result<()> {
    let version: i32 =
        conn.query_row("PRAGMA user_version", [], |row| row.get(0)).map_err(map_sql_error)?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }
    conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION).map_err(map_sql_error)?;
    Ok(())
}

fn map_sql_error(err: rusqlite::Error) -> NoctuaError {
    NoctuaError::from(InfraError::from(err))
}

fn map_pool_error(err: r2d2::Error) -> NoctuaError {
    NoctuaError::from(InfraError::from(err))
}
