//! SeaORM-backed storage adapters that satisfy the domain storage traits
//! while keeping the database backend swappable (SQLite by default,
//! PostgreSQL via feature flag).

mod entity;
mod errors;
mod migration;
mod order_store;
mod payment_store;
mod service_store;
mod user_store;


use std::sync::Arc;

use imeicheck_domain::storage::StorageResult;
use migration::run_migrations;
use sea_orm::{Database, DatabaseConnection};

use errors::map_db_err;

/// Shared storage handle used by the HTTP API and gateway pipeline.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is
    /// present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url).await.map_err(map_db_err)?;
        run_migrations(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub(crate) fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}
