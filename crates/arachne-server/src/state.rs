use std::sync::Arc;

use arachne_client::ReqwestRobotsFetcher;
use arachne_core::billing::BillingHandle;
use arachne_core::config::RuntimeConfig;
use arachne_core::credits::CreditGate;
use arachne_core::dispatch::ScrapeDispatcher;
use arachne_core::error::AppError;
use arachne_core::kickoff::CrawlKickoff;
use arachne_core::traits::{DefaultPriority, NoopRecharger, TracingNotifier};
use arachne_db::{Database, PgCrawlStore, PgJobQueue};

pub type AppGate = CreditGate<TracingNotifier, NoopRecharger>;
pub type AppDispatcher = ScrapeDispatcher<PgJobQueue, TracingNotifier, NoopRecharger, DefaultPriority>;
pub type AppKickoff = CrawlKickoff<PgJobQueue, PgCrawlStore, ReqwestRobotsFetcher>;

/// Shared application state, available to all route handlers via
/// `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub config: RuntimeConfig,
    pub dispatcher: AppDispatcher,
    pub kickoff: AppKickoff,
}

impl AppState {
    /// Wire the services against the database and the billing channel.
    pub fn build(
        db: Database,
        config: RuntimeConfig,
        billing: BillingHandle,
    ) -> Result<Self, AppError> {
        let gate = Arc::new(CreditGate::new(
            config.auth_mode.clone(),
            TracingNotifier,
            NoopRecharger,
            billing,
        ));
        let dispatcher = ScrapeDispatcher::new(db.job_queue(), gate, DefaultPriority);
        let kickoff = CrawlKickoff::new(
            db.job_queue(),
            db.crawl_store(),
            ReqwestRobotsFetcher::new()?,
            config.clone(),
        );

        Ok(Self {
            db,
            config,
            dispatcher,
            kickoff,
        })
    }
}
