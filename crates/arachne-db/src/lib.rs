pub mod account_repository;
pub mod config;
pub mod crawl_repository;
pub mod database;
pub mod queue_repository;

pub use account_repository::{PgAccountProvider, PgBillingLedger};
pub use config::DatabaseConfig;
pub use crawl_repository::PgCrawlStore;
pub use database::Database;
pub use queue_repository::PgJobQueue;
