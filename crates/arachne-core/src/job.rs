use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Document;
use crate::options::{InternalOptions, ScrapeOptions};

/// Base priority for request-path enqueues. Lower is higher priority; the
/// per-team factor from the priority service is added on top.
pub const BASE_PRIORITY: i32 = 10;

/// What kind of work a job carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// One-shot scrape of a single URL.
    SingleUrls,
    /// First job of a crawl: expands the seed URL into child scrape jobs.
    Kickoff,
    /// Child scrape job belonging to a crawl.
    Crawl,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::SingleUrls => "single_urls",
            JobMode::Kickoff => "kickoff",
            JobMode::Crawl => "crawl",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable state of a job in the queue.
///
/// `Prioritized` means the job is eligible but held back by the team's
/// concurrency cap. `Unknown` is returned for ids the queue has no record of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    Prioritized,
    Unknown,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
            JobState::Prioritized => "prioritized",
            JobState::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "delayed" => Ok(JobState::Delayed),
            "prioritized" => Ok(JobState::Prioritized),
            "unknown" => Ok(JobState::Unknown),
            _ => Err(format!("Unknown job state: {}", s)),
        }
    }
}

/// Webhook the worker should call on crawl events. Delivery is external;
/// the core only carries the configuration on the job descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
}

/// Inputs supplied to the queue for one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub url: String,
    pub mode: JobMode,
    pub team_id: String,
    pub scrape_options: ScrapeOptions,
    pub internal_options: InternalOptions,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    pub is_scrape: bool,
    pub start_time: DateTime<Utc>,
    pub zero_data_retention: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
}

impl JobDescriptor {
    pub fn new(url: impl Into<String>, mode: JobMode, team_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode,
            team_id: team_id.into(),
            scrape_options: ScrapeOptions::default(),
            internal_options: InternalOptions::default(),
            origin: "api".to_string(),
            integration: None,
            is_scrape: mode == JobMode::SingleUrls,
            start_time: Utc::now(),
            zero_data_retention: false,
            crawl_id: None,
            webhook: None,
        }
    }

    pub fn with_scrape_options(mut self, options: ScrapeOptions) -> Self {
        self.scrape_options = options;
        self
    }

    pub fn with_internal_options(mut self, options: InternalOptions) -> Self {
        self.internal_options = options;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_integration(mut self, integration: Option<String>) -> Self {
        self.integration = integration;
        self
    }

    pub fn with_zero_data_retention(mut self, zdr: bool) -> Self {
        self.zero_data_retention = zdr;
        self
    }

    pub fn with_crawl_id(mut self, crawl_id: Uuid) -> Self {
        self.crawl_id = Some(crawl_id);
        self
    }

    pub fn with_webhook(mut self, webhook: Option<WebhookConfig>) -> Self {
        self.webhook = webhook;
        self
    }
}

/// A job as surfaced by the queue gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub descriptor: JobDescriptor,
    pub state: JobState,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
}
