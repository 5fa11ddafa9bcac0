use reqwest::Client;
use url::Url;

use arachne_core::error::AppError;
use arachne_core::traits::{RobotsFetcher, RobotsInfo};

/// robots.txt fetcher using reqwest.
///
/// Full robots.txt interpretation happens in the crawl workers; the core
/// only needs the raw file and its `Crawl-delay`, if any.
#[derive(Clone)]
pub struct ReqwestRobotsFetcher {
    client: Client,
    insecure_client: Client,
}

impl ReqwestRobotsFetcher {
    pub fn new() -> Result<Self, AppError> {
        let builder = || {
            Client::builder()
                .user_agent("Arachne/0.1 (+https://arachne.dev)")
                .timeout(std::time::Duration::from_secs(10))
        };
        let client = builder()
            .build()
            .map_err(|e| AppError::Unexpected(e.to_string()))?;
        let insecure_client = builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| AppError::Unexpected(e.to_string()))?;

        Ok(Self {
            client,
            insecure_client,
        })
    }
}

impl RobotsFetcher for ReqwestRobotsFetcher {
    async fn fetch(
        &self,
        origin: &Url,
        skip_tls_verification: bool,
    ) -> Result<RobotsInfo, AppError> {
        let mut robots_url = origin.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        let client = if skip_tls_verification {
            &self.insecure_client
        } else {
            &self.client
        };

        let response = client
            .get(robots_url.as_str())
            .send()
            .await
            .map_err(|e| AppError::Unexpected(format!("robots.txt fetch failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Unexpected(format!(
                "robots.txt returned HTTP {} for {}",
                status.as_u16(),
                robots_url
            )));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| AppError::Unexpected(format!("robots.txt body unreadable: {e}")))?;

        let crawl_delay = parse_crawl_delay(&raw);
        Ok(RobotsInfo { raw, crawl_delay })
    }
}

/// Pull the first positive `Crawl-delay` directive out of a robots.txt body.
fn parse_crawl_delay(raw: &str) -> Option<f64> {
    raw.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("crawl-delay") {
                value.trim().parse::<f64>().ok()
            } else {
                None
            }
        })
        .find(|delay| *delay > 0.0)
}
