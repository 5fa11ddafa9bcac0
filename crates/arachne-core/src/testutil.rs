//! Test utilities: mock implementations of the core trait seams.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing test assertions on
//! recorded calls and state mutation mid-test.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use url::Url;
use uuid::Uuid;

use crate::crawl::{CrawlStore, StoredCrawl};
use crate::credits::CreditChunk;
use crate::document::Document;
use crate::error::AppError;
use crate::job::{Job, JobDescriptor, JobMode, JobState};
use crate::queue::JobQueue;
use crate::streamer::{Frame, FrameSink};
use crate::traits::{
    AutoRecharger, BillingLedger, JobPriorityResolver, NotificationKind, Notifier, RechargeConfig,
    RobotsFetcher, RobotsInfo,
};

/// Create a dummy descriptor for tests.
pub fn make_test_descriptor(team_id: &str) -> JobDescriptor {
    JobDescriptor::new("https://example.com", JobMode::SingleUrls, team_id)
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

/// Records every notification it is asked to deliver.
#[derive(Clone, Default)]
pub struct MockNotifier {
    pub sent: Arc<Mutex<Vec<(String, NotificationKind)>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for MockNotifier {
    async fn notify(&self, team_id: &str, kind: NotificationKind) -> Result<(), AppError> {
        self.sent.lock().unwrap().push((team_id.to_string(), kind));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockRecharger
// ---------------------------------------------------------------------------

/// Configurable auto-recharge backend.
#[derive(Clone)]
pub struct MockRecharger {
    config: RechargeConfig,
    refreshed: Arc<Mutex<Option<CreditChunk>>>,
    pub config_loads: Arc<Mutex<Vec<String>>>,
    pub attempts: Arc<Mutex<Vec<String>>>,
}

impl MockRecharger {
    /// Auto-recharge turned off for every team.
    pub fn disabled() -> Self {
        Self {
            config: RechargeConfig::default(),
            refreshed: Arc::new(Mutex::new(None)),
            config_loads: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Auto-recharge enabled (threshold 10); attempts succeed and yield
    /// the given refreshed chunk.
    pub fn recharging_to(chunk: CreditChunk) -> Self {
        Self {
            config: RechargeConfig {
                enabled: true,
                threshold: 10,
            },
            refreshed: Arc::new(Mutex::new(Some(chunk))),
            config_loads: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl AutoRecharger for MockRecharger {
    async fn config(&self, team_id: &str) -> Result<RechargeConfig, AppError> {
        self.config_loads.lock().unwrap().push(team_id.to_string());
        Ok(self.config)
    }

    async fn attempt(&self, team_id: &str) -> Result<Option<CreditChunk>, AppError> {
        self.attempts.lock().unwrap().push(team_id.to_string());
        Ok(self.refreshed.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// MockLedger
// ---------------------------------------------------------------------------

/// Records usage entries: (team_id, sub_id, credits, is_extract).
#[derive(Clone)]
pub struct MockLedger {
    pub recorded: Arc<Mutex<Vec<(String, Option<String>, u64, bool)>>>,
    fail: bool,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    /// Ledger that errors on every write.
    pub fn failing() -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingLedger for MockLedger {
    async fn record_usage(
        &self,
        team_id: &str,
        sub_id: Option<&str>,
        credits: u64,
        is_extract: bool,
    ) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::StoreError("ledger write failed".to_string()));
        }
        self.recorded.lock().unwrap().push((
            team_id.to_string(),
            sub_id.map(str::to_string),
            credits,
            is_extract,
        ));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockPriority
// ---------------------------------------------------------------------------

/// Priority resolver with a fixed per-team offset.
#[derive(Clone, Copy, Default)]
pub struct MockPriority {
    pub offset: i32,
}

impl JobPriorityResolver for MockPriority {
    async fn priority_for(&self, _team_id: &str, base_priority: i32) -> Result<i32, AppError> {
        Ok(base_priority + self.offset)
    }
}

// ---------------------------------------------------------------------------
// MockRobots
// ---------------------------------------------------------------------------

/// robots.txt fetcher returning either a fixed result or an error.
#[derive(Clone)]
pub struct MockRobots {
    info: Arc<Mutex<Option<RobotsInfo>>>,
}

impl MockRobots {
    /// Every fetch fails (site unreachable).
    pub fn unavailable() -> Self {
        Self {
            info: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_info(info: RobotsInfo) -> Self {
        Self {
            info: Arc::new(Mutex::new(Some(info))),
        }
    }
}

impl RobotsFetcher for MockRobots {
    async fn fetch(
        &self,
        _origin: &Url,
        _skip_tls_verification: bool,
    ) -> Result<RobotsInfo, AppError> {
        match self.info.lock().unwrap().clone() {
            Some(info) => Ok(info),
            None => Err(AppError::Unexpected("robots.txt unavailable".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// MockJobQueue
// ---------------------------------------------------------------------------

/// What should happen to the next enqueued job.
#[derive(Clone)]
enum EnqueueBehavior {
    Complete(Document),
    Fail(String),
}

/// In-memory job queue with scriptable terminal transitions.
#[derive(Clone)]
pub struct MockJobQueue {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    on_enqueue: Arc<Mutex<Option<EnqueueBehavior>>>,
    prioritized: Arc<Mutex<HashMap<String, HashSet<Uuid>>>>,
    pub enqueued: Arc<Mutex<Vec<(JobDescriptor, i32)>>>,
    pub removed: Arc<Mutex<Vec<Uuid>>>,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            on_enqueue: Arc::new(Mutex::new(None)),
            prioritized: Arc::new(Mutex::new(HashMap::new())),
            enqueued: Arc::new(Mutex::new(Vec::new())),
            removed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The next enqueued job completes immediately with this document.
    pub fn complete_next_enqueue(&self, document: Document) {
        *self.on_enqueue.lock().unwrap() = Some(EnqueueBehavior::Complete(document));
    }

    /// The next enqueued job fails immediately with this reason.
    pub fn fail_next_enqueue(&self, reason: &str) {
        *self.on_enqueue.lock().unwrap() = Some(EnqueueBehavior::Fail(reason.to_string()));
    }

    fn insert(&self, id: Uuid, team_id: &str, state: JobState) -> Job {
        let job = Job {
            id,
            descriptor: make_test_descriptor(team_id),
            state,
            priority: 10,
            created_at: Utc::now(),
            finished_at: state.is_terminal().then(Utc::now),
            return_value: None,
            failed_reason: None,
        };
        self.jobs.lock().unwrap().insert(id, job.clone());
        job
    }

    pub fn insert_waiting(&self, id: Uuid, team_id: &str) {
        self.insert(id, team_id, JobState::Waiting);
    }

    pub fn insert_completed(&self, id: Uuid, document: Document) {
        let mut job = Job {
            id,
            descriptor: make_test_descriptor("team-1"),
            state: JobState::Completed,
            priority: 10,
            created_at: Utc::now(),
            finished_at: Some(Utc::now()),
            return_value: Some(document),
            failed_reason: None,
        };
        if let Some(existing) = self.jobs.lock().unwrap().get(&id) {
            job.descriptor = existing.descriptor.clone();
        }
        self.jobs.lock().unwrap().insert(id, job);
    }

    pub fn insert_failed(&self, id: Uuid, reason: &str) {
        let mut jobs = self.jobs.lock().unwrap();
        let mut job = Job {
            id,
            descriptor: make_test_descriptor("team-1"),
            state: JobState::Failed,
            priority: 10,
            created_at: Utc::now(),
            finished_at: Some(Utc::now()),
            return_value: None,
            failed_reason: Some(reason.to_string()),
        };
        if let Some(existing) = jobs.get(&id) {
            job.descriptor = existing.descriptor.clone();
        }
        jobs.insert(id, job);
    }

    pub fn insert_prioritized(&self, id: Uuid, team_id: &str) {
        self.insert(id, team_id, JobState::Prioritized);
        self.prioritized
            .lock()
            .unwrap()
            .entry(team_id.to_string())
            .or_default()
            .insert(id);
    }
}

impl Default for MockJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for MockJobQueue {
    async fn enqueue(
        &self,
        descriptor: &JobDescriptor,
        job_id: Uuid,
        priority: i32,
    ) -> Result<(), AppError> {
        if self.jobs.lock().unwrap().contains_key(&job_id) {
            // Idempotent retry of an existing id.
            return Ok(());
        }
        self.enqueued
            .lock()
            .unwrap()
            .push((descriptor.clone(), priority));

        let behavior = self.on_enqueue.lock().unwrap().take();
        let (state, return_value, failed_reason) = match behavior {
            Some(EnqueueBehavior::Complete(document)) => {
                (JobState::Completed, Some(document), None)
            }
            Some(EnqueueBehavior::Fail(reason)) => (JobState::Failed, None, Some(reason)),
            None => (JobState::Waiting, None, None),
        };

        let job = Job {
            id: job_id,
            descriptor: descriptor.clone(),
            state,
            priority,
            created_at: Utc::now(),
            finished_at: state.is_terminal().then(Utc::now),
            return_value,
            failed_reason,
        };
        self.jobs.lock().unwrap().insert(job_id, job);
        Ok(())
    }

    async fn state(&self, job_id: Uuid) -> Result<JobState, AppError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .map(|j| j.state)
            .unwrap_or(JobState::Unknown))
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, AppError> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Job>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(ids.iter().filter_map(|id| jobs.get(id).cloned()).collect())
    }

    async fn return_value(&self, job_id: Uuid) -> Result<Option<Document>, AppError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .filter(|j| j.state == JobState::Completed)
            .and_then(|j| j.return_value.clone()))
    }

    async fn remove(&self, job_id: Uuid) -> Result<(), AppError> {
        self.removed.lock().unwrap().push(job_id);
        self.jobs.lock().unwrap().remove(&job_id);
        Ok(())
    }

    async fn concurrency_limited_jobs(&self, team_id: &str) -> Result<HashSet<Uuid>, AppError> {
        Ok(self
            .prioritized
            .lock()
            .unwrap()
            .get(team_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockCrawlStore
// ---------------------------------------------------------------------------

/// In-memory crawl store.
#[derive(Clone)]
pub struct MockCrawlStore {
    pub crawls: Arc<Mutex<HashMap<Uuid, StoredCrawl>>>,
    crawl_jobs: Arc<Mutex<HashMap<Uuid, HashSet<Uuid>>>>,
    done: Arc<Mutex<HashMap<Uuid, Vec<Uuid>>>>,
    expiry: Arc<Mutex<HashMap<Uuid, chrono::DateTime<Utc>>>>,
    pub v0_teams: Arc<Mutex<HashSet<String>>>,
}

impl MockCrawlStore {
    pub fn new() -> Self {
        Self {
            crawls: Arc::new(Mutex::new(HashMap::new())),
            crawl_jobs: Arc::new(Mutex::new(HashMap::new())),
            done: Arc::new(Mutex::new(HashMap::new())),
            expiry: Arc::new(Mutex::new(HashMap::new())),
            v0_teams: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl Default for MockCrawlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlStore for MockCrawlStore {
    async fn save_crawl(&self, crawl_id: Uuid, stored: &StoredCrawl) -> Result<(), AppError> {
        self.crawls.lock().unwrap().insert(crawl_id, stored.clone());
        self.expiry
            .lock()
            .unwrap()
            .insert(crawl_id, Utc::now() + chrono::Duration::hours(24));
        Ok(())
    }

    async fn get_crawl(&self, crawl_id: Uuid) -> Result<Option<StoredCrawl>, AppError> {
        Ok(self.crawls.lock().unwrap().get(&crawl_id).cloned())
    }

    async fn add_crawl_job(&self, crawl_id: Uuid, job_id: Uuid) -> Result<(), AppError> {
        self.crawl_jobs
            .lock()
            .unwrap()
            .entry(crawl_id)
            .or_default()
            .insert(job_id);
        Ok(())
    }

    async fn get_crawl_jobs(&self, crawl_id: Uuid) -> Result<HashSet<Uuid>, AppError> {
        Ok(self
            .crawl_jobs
            .lock()
            .unwrap()
            .get(&crawl_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_done(&self, crawl_id: Uuid, job_id: Uuid) -> Result<(), AppError> {
        let mut done = self.done.lock().unwrap();
        let list = done.entry(crawl_id).or_default();
        if !list.contains(&job_id) {
            list.push(job_id);
        }
        Ok(())
    }

    async fn get_done_ordered(&self, crawl_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .done
            .lock()
            .unwrap()
            .get(&crawl_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_done_length(&self, crawl_id: Uuid) -> Result<usize, AppError> {
        Ok(self
            .done
            .lock()
            .unwrap()
            .get(&crawl_id)
            .map(Vec::len)
            .unwrap_or(0))
    }

    async fn is_finished(&self, crawl_id: Uuid) -> Result<bool, AppError> {
        if let Some(crawl) = self.crawls.lock().unwrap().get(&crawl_id) {
            if crawl.cancelled {
                return Ok(true);
            }
        }
        let jobs = self.get_crawl_jobs(crawl_id).await?;
        let done = self.get_done_length(crawl_id).await?;
        Ok(!jobs.is_empty() && done >= jobs.len())
    }

    async fn is_finished_locked(&self, crawl_id: Uuid) -> Result<bool, AppError> {
        self.is_finished(crawl_id).await
    }

    async fn get_expiry(&self, crawl_id: Uuid) -> Result<Option<chrono::DateTime<Utc>>, AppError> {
        Ok(self.expiry.lock().unwrap().get(&crawl_id).copied())
    }

    async fn cancel(&self, crawl_id: Uuid) -> Result<(), AppError> {
        if let Some(crawl) = self.crawls.lock().unwrap().get_mut(&crawl_id) {
            crawl.cancelled = true;
        }
        Ok(())
    }

    async fn mark_team_v0(&self, team_id: &str) -> Result<(), AppError> {
        self.v0_teams.lock().unwrap().insert(team_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CollectingSink
// ---------------------------------------------------------------------------

/// Frame sink that records everything it is asked to send.
#[derive(Clone, Default)]
pub struct CollectingSink {
    pub frames: Arc<Mutex<Vec<Frame>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for CollectingSink {
    async fn send(&mut self, frame: Frame) -> Result<(), AppError> {
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }
}
