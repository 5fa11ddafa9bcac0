//! Multi-URL crawl setup: validation, limit clamping, robots fetch, and the
//! kickoff enqueue.

use chrono::Utc;
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::crawl::{CrawlStore, StoredCrawl};
use crate::credits::AuthContext;
use crate::error::AppError;
use crate::job::{JobDescriptor, JobMode, WebhookConfig, BASE_PRIORITY};
use crate::options::{CrawlerOptions, InternalOptions, ScrapeOptions};
use crate::queue::JobQueue;
use crate::traits::RobotsFetcher;
use crate::util::normalize_url;

/// A crawl request after HTTP decoding.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub url: String,
    pub scrape_options: ScrapeOptions,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub limit: i64,
    pub max_concurrency: Option<i32>,
    pub crawl_delay: Option<f64>,
    pub webhook: Option<WebhookConfig>,
    pub zero_data_retention: bool,
    pub origin: Option<String>,
}

/// A successfully admitted crawl.
#[derive(Debug, Clone, Copy)]
pub struct CrawlCreated {
    pub crawl_id: Uuid,
}

/// Sets up crawls: persists the crawl record and enqueues the kickoff job
/// that expands the seed URL into child scrape jobs.
pub struct CrawlKickoff<Q, S, R>
where
    Q: JobQueue,
    S: CrawlStore,
    R: RobotsFetcher,
{
    queue: Q,
    store: S,
    robots: R,
    config: RuntimeConfig,
}

impl<Q, S, R> CrawlKickoff<Q, S, R>
where
    Q: JobQueue,
    S: CrawlStore,
    R: RobotsFetcher,
{
    pub fn new(queue: Q, store: S, robots: R, config: RuntimeConfig) -> Self {
        Self {
            queue,
            store,
            robots,
            config,
        }
    }

    pub async fn crawl(
        &self,
        request: CrawlRequest,
        auth: &AuthContext,
    ) -> Result<CrawlCreated, AppError> {
        let url = normalize_url(&request.url)?;

        let flags = auth.flags();
        if request.zero_data_retention && !flags.allow_zdr {
            return Err(AppError::ForbiddenFlag(
                "Zero data retention is not enabled for this team.".to_string(),
            ));
        }
        let zero_data_retention = request.zero_data_retention || flags.force_zdr;

        let crawler_options = CrawlerOptions {
            include_paths: request.include_paths,
            exclude_paths: request.exclude_paths,
            limit: request.limit,
            crawl_delay: request.crawl_delay,
            ..Default::default()
        };
        crawler_options.validate_patterns()?;

        let remaining_credits = if self.config.auth_mode.is_db_auth() {
            auth.chunk
                .as_ref()
                .map(|c| c.remaining_credits)
                .unwrap_or(i64::MAX)
        } else {
            i64::MAX
        };

        let mut stored = StoredCrawl {
            origin_url: url.to_string(),
            crawler_options,
            scrape_options: request.scrape_options,
            internal_options: InternalOptions {
                disable_smart_wait_cache: true,
                store_in_gcs: self.config.gcs_bucket.is_some(),
            },
            team_id: auth.team_id.clone(),
            created_at: Utc::now(),
            max_concurrency: resolve_max_concurrency(
                request.max_concurrency,
                auth.chunk.as_ref().map(|c| c.concurrency),
            ),
            robots: None,
            cancelled: false,
            zero_data_retention,
        };
        stored.crawler_options.limit = stored.crawler_options.limit.min(remaining_credits).max(0);

        let crawl_id = Uuid::new_v4();

        match self
            .robots
            .fetch(&url, stored.scrape_options.skip_tls_verification)
            .await
        {
            Ok(info) => {
                if let Some(delay) = info.crawl_delay {
                    if delay > 0.0 && stored.crawler_options.crawl_delay.is_none() {
                        stored.crawler_options.crawl_delay = Some(delay);
                    }
                }
                stored.robots = Some(info.raw);
            }
            Err(e) => {
                tracing::debug!(crawl_id = %crawl_id, error = %e, "Failed to fetch robots.txt");
            }
        }

        self.store.save_crawl(crawl_id, &stored).await?;

        let descriptor = JobDescriptor::new(url.as_str(), JobMode::Kickoff, &auth.team_id)
            .with_scrape_options(stored.scrape_options.clone())
            .with_internal_options(stored.internal_options.clone())
            .with_origin(request.origin.unwrap_or_else(|| "api".to_string()))
            .with_zero_data_retention(zero_data_retention)
            .with_crawl_id(crawl_id)
            .with_webhook(request.webhook);

        self.queue
            .enqueue(&descriptor, Uuid::new_v4(), BASE_PRIORITY)
            .await?;
        tracing::debug!(crawl_id = %crawl_id, url = %url, "Crawl kickoff enqueued");

        Ok(CrawlCreated { crawl_id })
    }
}

/// Per-crawl concurrency: minimum of the requested value and the team cap
/// when both exist, otherwise whichever is present.
fn resolve_max_concurrency(requested: Option<i32>, team_cap: Option<i32>) -> Option<i32> {
    match (requested, team_cap) {
        (Some(requested), Some(cap)) => Some(requested.min(cap)),
        (requested, cap) => requested.or(cap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, Environment};
    use crate::credits::{CreditChunk, TeamFlags};
    use crate::testutil::{MockCrawlStore, MockJobQueue, MockRobots};
    use crate::traits::RobotsInfo;

    fn config(auth_mode: AuthMode) -> RuntimeConfig {
        RuntimeConfig {
            auth_mode,
            environment: Environment::Local,
            gcs_bucket: None,
        }
    }

    fn chunk_with_flags(remaining: i64, flags: TeamFlags) -> CreditChunk {
        CreditChunk {
            adjusted_credits_used: 0,
            remaining_credits: remaining,
            total_credits_sum: remaining,
            sub_id: None,
            sub_current_period_start: None,
            sub_current_period_end: None,
            is_extract: false,
            flags,
            concurrency: 8,
        }
    }

    fn auth(remaining: i64, flags: TeamFlags) -> AuthContext {
        AuthContext {
            team_id: "team-1".to_string(),
            chunk: Some(chunk_with_flags(remaining, flags)),
        }
    }

    fn request(url: &str) -> CrawlRequest {
        CrawlRequest {
            url: url.to_string(),
            scrape_options: ScrapeOptions::default(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            limit: 1_000,
            max_concurrency: None,
            crawl_delay: None,
            webhook: None,
            zero_data_retention: false,
            origin: None,
        }
    }

    fn kickoff(
        queue: MockJobQueue,
        store: MockCrawlStore,
        robots: MockRobots,
        auth_mode: AuthMode,
    ) -> CrawlKickoff<MockJobQueue, MockCrawlStore, MockRobots> {
        CrawlKickoff::new(queue, store, robots, config(auth_mode))
    }

    #[tokio::test]
    async fn zdr_without_entitlement_is_forbidden() {
        let store = MockCrawlStore::new();
        let kickoff = kickoff(
            MockJobQueue::new(),
            store.clone(),
            MockRobots::unavailable(),
            AuthMode::DbAuth,
        );

        let mut req = request("https://example.com");
        req.zero_data_retention = true;

        let err = kickoff
            .crawl(req, &auth(100, TeamFlags::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ForbiddenFlag(_)));
        assert!(store.crawls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn force_zdr_flag_turns_zdr_on() {
        let store = MockCrawlStore::new();
        let kickoff = kickoff(
            MockJobQueue::new(),
            store.clone(),
            MockRobots::unavailable(),
            AuthMode::DbAuth,
        );

        let flags = TeamFlags {
            force_zdr: true,
            allow_zdr: true,
            ..Default::default()
        };
        kickoff
            .crawl(request("https://example.com"), &auth(100, flags))
            .await
            .unwrap();

        let crawls = store.crawls.lock().unwrap();
        let (_, stored) = crawls.iter().next().unwrap();
        assert!(stored.zero_data_retention);
    }

    #[tokio::test]
    async fn invalid_regex_rejects_without_persisting() {
        let store = MockCrawlStore::new();
        let queue = MockJobQueue::new();
        let kickoff = kickoff(
            queue.clone(),
            store.clone(),
            MockRobots::unavailable(),
            AuthMode::DbAuth,
        );

        let mut req = request("https://example.com");
        req.exclude_paths = vec!["[bad".to_string()];

        let err = kickoff
            .crawl(req, &auth(100, TeamFlags::default()))
            .await
            .unwrap_err();
        match err {
            AppError::InvalidInput(msg) => assert!(msg.contains("[bad")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        assert!(store.crawls.lock().unwrap().is_empty());
        assert!(queue.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn limit_is_clamped_to_remaining_credits() {
        let store = MockCrawlStore::new();
        let queue = MockJobQueue::new();
        let kickoff = kickoff(
            queue.clone(),
            store.clone(),
            MockRobots::unavailable(),
            AuthMode::DbAuth,
        );

        kickoff
            .crawl(request("https://example.com"), &auth(50, TeamFlags::default()))
            .await
            .unwrap();

        let crawls = store.crawls.lock().unwrap();
        let (_, stored) = crawls.iter().next().unwrap();
        assert_eq!(stored.crawler_options.limit, 50);

        // One kickoff job at base priority.
        let enqueued = queue.enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].0.mode, JobMode::Kickoff);
        assert_eq!(enqueued[0].1, BASE_PRIORITY);
        assert!(enqueued[0].0.crawl_id.is_some());
    }

    #[tokio::test]
    async fn limit_is_not_clamped_without_db_auth() {
        let store = MockCrawlStore::new();
        let kickoff = kickoff(
            MockJobQueue::new(),
            store.clone(),
            MockRobots::unavailable(),
            AuthMode::Disabled,
        );

        kickoff
            .crawl(
                request("https://example.com"),
                &AuthContext {
                    team_id: "preview".to_string(),
                    chunk: None,
                },
            )
            .await
            .unwrap();

        let crawls = store.crawls.lock().unwrap();
        let (_, stored) = crawls.iter().next().unwrap();
        assert_eq!(stored.crawler_options.limit, 1_000);
    }

    #[tokio::test]
    async fn robots_crawl_delay_is_adopted_when_user_set_none() {
        let store = MockCrawlStore::new();
        let robots = MockRobots::with_info(RobotsInfo {
            raw: "User-agent: *\nCrawl-delay: 3".to_string(),
            crawl_delay: Some(3.0),
        });
        let kickoff = kickoff(MockJobQueue::new(), store.clone(), robots, AuthMode::DbAuth);

        kickoff
            .crawl(request("https://example.com"), &auth(100, TeamFlags::default()))
            .await
            .unwrap();

        let crawls = store.crawls.lock().unwrap();
        let (_, stored) = crawls.iter().next().unwrap();
        assert_eq!(stored.crawler_options.crawl_delay, Some(3.0));
        assert!(stored.robots.is_some());
    }

    #[tokio::test]
    async fn user_crawl_delay_wins_over_robots() {
        let store = MockCrawlStore::new();
        let robots = MockRobots::with_info(RobotsInfo {
            raw: "Crawl-delay: 10".to_string(),
            crawl_delay: Some(10.0),
        });
        let kickoff = kickoff(MockJobQueue::new(), store.clone(), robots, AuthMode::DbAuth);

        let mut req = request("https://example.com");
        req.crawl_delay = Some(1.5);
        kickoff
            .crawl(req, &auth(100, TeamFlags::default()))
            .await
            .unwrap();

        let crawls = store.crawls.lock().unwrap();
        let (_, stored) = crawls.iter().next().unwrap();
        assert_eq!(stored.crawler_options.crawl_delay, Some(1.5));
    }

    #[tokio::test]
    async fn robots_failure_is_non_fatal() {
        let store = MockCrawlStore::new();
        let kickoff = kickoff(
            MockJobQueue::new(),
            store.clone(),
            MockRobots::unavailable(),
            AuthMode::DbAuth,
        );

        kickoff
            .crawl(request("https://example.com"), &auth(100, TeamFlags::default()))
            .await
            .unwrap();

        let crawls = store.crawls.lock().unwrap();
        let (_, stored) = crawls.iter().next().unwrap();
        assert!(stored.robots.is_none());
    }

    #[test]
    fn max_concurrency_resolution() {
        assert_eq!(resolve_max_concurrency(Some(4), Some(8)), Some(4));
        assert_eq!(resolve_max_concurrency(Some(16), Some(8)), Some(8));
        assert_eq!(resolve_max_concurrency(Some(4), None), Some(4));
        assert_eq!(resolve_max_concurrency(None, Some(8)), Some(8));
        assert_eq!(resolve_max_concurrency(None, None), None);
    }
}
