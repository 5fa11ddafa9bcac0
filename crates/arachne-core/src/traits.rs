use std::future::Future;

use url::Url;

use crate::credits::CreditChunk;
use crate::error::AppError;

/// Usage notifications emitted by the credit gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Usage crossed 80% of the period allowance.
    ApproachingLimit,
    /// Usage exceeded the period allowance.
    LimitReached,
}

/// Delivers usage notifications to a team (email, webhook — external).
/// Delivery failures are logged by callers, never propagated.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        team_id: &str,
        kind: NotificationKind,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Notifier that only logs; delivery (email, webhook) is wired externally.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    async fn notify(&self, team_id: &str, kind: NotificationKind) -> Result<(), AppError> {
        tracing::info!(team_id = %team_id, ?kind, "Usage notification emitted");
        Ok(())
    }
}

/// Auto-recharge configuration for one team.
#[derive(Debug, Clone, Copy, Default)]
pub struct RechargeConfig {
    pub enabled: bool,
    /// Recharge fires when remaining credits drop below this.
    pub threshold: i64,
}

/// Payment-provider-backed credit top-up (external).
pub trait AutoRecharger: Send + Sync {
    fn config(&self, team_id: &str)
        -> impl Future<Output = Result<RechargeConfig, AppError>> + Send;

    /// Attempt a recharge. Returns the refreshed credit chunk on success,
    /// `None` when the provider declined.
    fn attempt(
        &self,
        team_id: &str,
    ) -> impl Future<Output = Result<Option<CreditChunk>, AppError>> + Send;
}

/// Recharger used when no payment provider is wired up: auto-recharge is
/// reported disabled and attempts always decline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecharger;

impl AutoRecharger for NoopRecharger {
    async fn config(&self, _team_id: &str) -> Result<RechargeConfig, AppError> {
        Ok(RechargeConfig::default())
    }

    async fn attempt(&self, _team_id: &str) -> Result<Option<CreditChunk>, AppError> {
        Ok(None)
    }
}

/// Records aggregated credit usage against the billing ledger (external
/// persistence). Only ever called from the billing aggregator task.
pub trait BillingLedger: Send + Sync + 'static {
    fn record_usage(
        &self,
        team_id: &str,
        sub_id: Option<&str>,
        credits: u64,
        is_extract: bool,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Resolves the effective enqueue priority for a team (external service).
pub trait JobPriorityResolver: Send + Sync {
    fn priority_for(
        &self,
        team_id: &str,
        base_priority: i32,
    ) -> impl Future<Output = Result<i32, AppError>> + Send;
}

/// Priority resolver that applies no per-team offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPriority;

impl JobPriorityResolver for DefaultPriority {
    async fn priority_for(&self, _team_id: &str, base_priority: i32) -> Result<i32, AppError> {
        Ok(base_priority)
    }
}

/// robots.txt contents as far as the core cares about them.
#[derive(Debug, Clone, Default)]
pub struct RobotsInfo {
    pub raw: String,
    /// `Crawl-delay` in seconds, when the file specifies one.
    pub crawl_delay: Option<f64>,
}

/// Fetches robots.txt for a site via the crawler capability (external).
pub trait RobotsFetcher: Send + Sync {
    fn fetch(
        &self,
        origin: &Url,
        skip_tls_verification: bool,
    ) -> impl Future<Output = Result<RobotsInfo, AppError>> + Send;
}

/// A resolved account: team identity plus its billing snapshot.
#[derive(Debug, Clone)]
pub struct Account {
    pub team_id: String,
    pub chunk: CreditChunk,
}

/// Resolves an API key to an account (DB-auth mode).
pub trait AccountProvider: Send + Sync {
    fn resolve_key(
        &self,
        api_key: &str,
    ) -> impl Future<Output = Result<Option<Account>, AppError>> + Send;
}
