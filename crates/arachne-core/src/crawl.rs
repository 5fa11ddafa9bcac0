use std::collections::HashSet;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::options::{CrawlerOptions, InternalOptions, ScrapeOptions};

/// Per-crawl metadata persisted for the crawl's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCrawl {
    pub origin_url: String,
    pub crawler_options: CrawlerOptions,
    pub scrape_options: ScrapeOptions,
    pub internal_options: InternalOptions,
    pub team_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<i32>,
    /// Raw robots.txt captured at kickoff, when the fetch succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub zero_data_retention: bool,
}

/// Persistent store for crawl state: the crawl record, its child-job id
/// set, and the append-only ordered list of finished job ids.
///
/// Records expire after a configured TTL from last activity.
pub trait CrawlStore: Send + Sync + Clone {
    fn save_crawl(
        &self,
        crawl_id: Uuid,
        stored: &StoredCrawl,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_crawl(
        &self,
        crawl_id: Uuid,
    ) -> impl Future<Output = Result<Option<StoredCrawl>, AppError>> + Send;

    fn add_crawl_job(
        &self,
        crawl_id: Uuid,
        job_id: Uuid,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_crawl_jobs(
        &self,
        crawl_id: Uuid,
    ) -> impl Future<Output = Result<HashSet<Uuid>, AppError>> + Send;

    /// Append a job id to the done list, preserving completion order.
    fn push_done(
        &self,
        crawl_id: Uuid,
        job_id: Uuid,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_done_ordered(
        &self,
        crawl_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Uuid>, AppError>> + Send;

    fn get_done_length(
        &self,
        crawl_id: Uuid,
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// True once the crawl is terminal: cancelled, or every non-throttled
    /// child job finished.
    fn is_finished(&self, crawl_id: Uuid) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Like [`CrawlStore::is_finished`] but under an advisory lock, so only
    /// one caller observes the finished transition and runs finalization.
    fn is_finished_locked(
        &self,
        crawl_id: Uuid,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn get_expiry(
        &self,
        crawl_id: Uuid,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, AppError>> + Send;

    fn cancel(&self, crawl_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Record that a team has hit a v0 endpoint (global migration set).
    fn mark_team_v0(&self, team_id: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}
