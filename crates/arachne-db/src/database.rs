use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use arachne_core::AppError;

use crate::account_repository::{PgAccountProvider, PgBillingLedger};
use crate::config::DatabaseConfig;
use crate::crawl_repository::PgCrawlStore;
use crate::queue_repository::PgJobQueue;

/// Central database facade — owns the connection pool, runs migrations,
/// and vends repository instances.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL with the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::StoreError(format!("Failed to connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::StoreError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get a [`PgJobQueue`] backed by this pool.
    pub fn job_queue(&self) -> PgJobQueue {
        PgJobQueue::new(self.pool.clone())
    }

    /// Get a [`PgCrawlStore`] backed by this pool.
    pub fn crawl_store(&self) -> PgCrawlStore {
        PgCrawlStore::new(self.pool.clone())
    }

    /// Get a [`PgAccountProvider`] backed by this pool.
    pub fn account_provider(&self) -> PgAccountProvider {
        PgAccountProvider::new(self.pool.clone())
    }

    /// Get a [`PgBillingLedger`] backed by this pool.
    pub fn billing_ledger(&self) -> PgBillingLedger {
        PgBillingLedger::new(self.pool.clone())
    }

    /// Lightweight connectivity probe for health endpoints.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StoreError(e.to_string()))?;
        Ok(())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
