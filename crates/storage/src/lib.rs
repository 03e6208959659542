//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag).

mod api_key_store;
mod builder;
mod entity;
mod errors;
mod invoice_store;
mod migration;
mod profile_store;
mod service_store;
mod webhook_store;

use std::sync::Arc;

pub use builder::StorageBuilder;
use nanopay_domain::storage::StorageResult;
use sea_orm::DatabaseConnection;

/// Shared storage handle used by the HTTP API and the payment watcher.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::builder().database_url(database_url).build().await
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}
