//! Application context - dependency injection container

use std::sync::Arc;

use noctua_core::{AggregationService, AggregateStore, EventStore};
use noctua_domain::{NoctuaConfig, Result};
use noctua_infra::database::{DbManager, RetryPolicy, SqliteAggregateStore, SqliteEventStore};

/// Application context - holds the wired services for one pass
pub struct AppContext {
    pub config: NoctuaConfig,
    pub db: Arc<DbManager>,
    pub aggregation: Arc<AggregationService>,
}

impl AppContext {
    /// Wire the storage adapters and the aggregation service.
    ///
    /// Opens the shared store, applies migrations, and verifies the store
    /// answers queries before any pass work starts, so boot failures surface
    /// as fatal instead of per-user noise.
    pub fn new(config: NoctuaConfig) -> Result<Self> {
        let db = Arc::new(DbManager::new(&config.database.path, &config.database)?);
        db.run_migrations()?;
        db.health_check()?;

        let events: Arc<dyn EventStore> = Arc::new(SqliteEventStore::new(Arc::clone(&db)));
        let store: Arc<dyn AggregateStore> = Arc::new(SqliteAggregateStore::new(
            Arc::clone(&db),
            RetryPolicy::from_config(&config.database),
        ));
        let aggregation = Arc::new(AggregationService::new(events, store, config.clone()));

        Ok(Self { config, db, aggregation })
    }
}
