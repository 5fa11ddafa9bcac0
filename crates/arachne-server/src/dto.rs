use serde::{Deserialize, Serialize};
use uuid::Uuid;

use arachne_core::document::LegacyDocument;
use arachne_core::job::WebhookConfig;
use arachne_core::options::{
    ExtractorOptions, PageOptions, ScrapeOptions, DEFAULT_TIMEOUT_MS,
};

// ---------------------------------------------------------------------------
// v0 scrape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeApiRequest {
    pub url: String,
    /// Accepted for v0 compatibility; ignored on the single-URL path.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub crawler_options: Option<serde_json::Value>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub page_options: Option<PageOptions>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub extractor_options: Option<ExtractorOptions>,
    #[serde(default)]
    pub origin: Option<String>,
    /// Milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub integration: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ScrapeApiResponse {
    pub success: bool,
    #[schema(value_type = Object)]
    pub data: LegacyDocument,
    #[serde(rename = "returnCode")]
    pub return_code: u16,
}

// ---------------------------------------------------------------------------
// v1 crawl
// ---------------------------------------------------------------------------

/// Scrape options accepted on the v1 crawl body.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrawlScrapeOptionsDto {
    #[serde(default)]
    pub only_main_content: bool,
    #[serde(default)]
    pub include_html: bool,
    #[serde(default)]
    pub include_raw_html: bool,
    #[serde(default)]
    pub wait_for: Option<u64>,
    #[serde(default)]
    pub skip_tls_verification: bool,
    /// Milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl From<CrawlScrapeOptionsDto> for ScrapeOptions {
    fn from(dto: CrawlScrapeOptionsDto) -> Self {
        ScrapeOptions {
            only_main_content: dto.only_main_content,
            include_html: dto.include_html,
            include_raw_html: dto.include_raw_html,
            wait_for: dto.wait_for,
            skip_tls_verification: dto.skip_tls_verification,
            timeout_ms: dto.timeout.unwrap_or(DEFAULT_TIMEOUT_MS),
            extractor: Default::default(),
        }
    }
}

/// Webhook: either a bare URL string or an object with a `url` field.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum WebhookDto {
    Url(String),
    Config { url: String },
}

impl From<WebhookDto> for WebhookConfig {
    fn from(dto: WebhookDto) -> Self {
        match dto {
            WebhookDto::Url(url) | WebhookDto::Config { url } => WebhookConfig { url },
        }
    }
}

fn default_crawl_limit() -> i64 {
    10_000
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrawlApiRequest {
    pub url: String,
    #[serde(default)]
    pub scrape_options: Option<CrawlScrapeOptionsDto>,
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    #[serde(default = "default_crawl_limit")]
    pub limit: i64,
    #[serde(default)]
    pub max_concurrency: Option<i32>,
    /// Seconds between requests to the crawled site.
    #[serde(default)]
    pub crawl_delay: Option<f64>,
    #[serde(default)]
    pub webhook: Option<WebhookDto>,
    #[serde(default)]
    pub zero_data_retention: bool,
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CrawlApiResponse {
    pub success: bool,
    pub id: Uuid,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(rename = "returnCode")]
    pub return_code: u16,
}
