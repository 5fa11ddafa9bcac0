//! Single-URL scrape path: validate → gate → enqueue → await → transform.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::blocklist::is_url_blocked;
use crate::credits::{AuthContext, CreditGate};
use crate::document::{Document, LegacyDocument};
use crate::error::AppError;
use crate::job::{JobDescriptor, JobMode, JobState, BASE_PRIORITY};
use crate::options::{ExtractorOptions, PageOptions, ScrapeOptions};
use crate::queue::JobQueue;
use crate::traits::{AutoRecharger, JobPriorityResolver, Notifier};
use crate::util::normalize_url;

/// Credits charged for a plain scrape.
const SCRAPE_CREDITS: u64 = 1;

/// Extra credits charged when LLM extraction ran.
const LLM_EXTRACTION_CREDITS: u64 = 4;

/// How often the completion wait polls the queue.
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A single-URL scrape request after HTTP decoding.
#[derive(Debug, Clone, Default)]
pub struct ScrapeRequest {
    pub url: String,
    pub page_options: Option<PageOptions>,
    pub extractor_options: Option<ExtractorOptions>,
    pub timeout_ms: Option<u64>,
    pub origin: Option<String>,
    pub integration: Option<String>,
}

/// Successful scrape result in the legacy response shape.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub document: LegacyDocument,
}

/// Orchestrates the single-URL request path.
///
/// Generic over the queue, credit-gate collaborators, and the priority
/// service, enabling dependency injection in tests.
pub struct ScrapeDispatcher<Q, N, R, P>
where
    Q: JobQueue,
    N: Notifier,
    R: AutoRecharger,
    P: JobPriorityResolver,
{
    queue: Q,
    gate: Arc<CreditGate<N, R>>,
    priority: P,
}

impl<Q, N, R, P> ScrapeDispatcher<Q, N, R, P>
where
    Q: JobQueue,
    N: Notifier,
    R: AutoRecharger,
    P: JobPriorityResolver,
{
    pub fn new(queue: Q, gate: Arc<CreditGate<N, R>>, priority: P) -> Self {
        Self {
            queue,
            gate,
            priority,
        }
    }

    /// Run the full scrape path for one request.
    pub async fn scrape(
        &self,
        request: ScrapeRequest,
        auth: &AuthContext,
    ) -> Result<ScrapeOutcome, AppError> {
        let url = normalize_url(&request.url)?;
        if is_url_blocked(&url) {
            return Err(AppError::BlocklistedUrl);
        }

        let options = ScrapeOptions::merged(
            request.page_options,
            request.extractor_options,
            request.timeout_ms,
        )?;
        let is_llm = options.extractor.mode.is_llm_extraction();

        let priority = self
            .priority
            .priority_for(&auth.team_id, BASE_PRIORITY)
            .await?;

        let check = self
            .gate
            .check(&auth.team_id, auth.chunk.as_ref(), SCRAPE_CREDITS)
            .await?;
        if !check.admitted {
            return Err(AppError::InsufficientCredits(check.message.unwrap_or_else(
                || "Insufficient credits to perform this request.".to_string(),
            )));
        }

        let job_id = Uuid::new_v4();
        let descriptor = JobDescriptor::new(url.as_str(), JobMode::SingleUrls, &auth.team_id)
            .with_scrape_options(options.clone())
            .with_origin(request.origin.unwrap_or_else(|| "api".to_string()))
            .with_integration(request.integration);

        self.queue.enqueue(&descriptor, job_id, priority).await?;
        tracing::debug!(job_id = %job_id, url = %url, priority, "Scrape job enqueued");

        // Central suspension point. On timeout the queue entry is left in
        // place; the worker's terminal handler owns its lifecycle.
        let timeout = Duration::from_millis(options.timeout_ms);
        let document = wait_for_job(&self.queue, job_id, timeout).await?;

        if let Err(e) = self.queue.remove(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to remove terminal job");
        }

        let document = document.elide(&options);

        let credits = SCRAPE_CREDITS + if is_llm { LLM_EXTRACTION_CREDITS } else { 0 };
        let chunk = check.chunk.as_ref().or(auth.chunk.as_ref());
        self.gate.bill(
            &auth.team_id,
            chunk.and_then(|c| c.sub_id.as_deref()),
            credits,
            false,
        );

        Ok(ScrapeOutcome {
            document: document.into_legacy(),
        })
    }
}

/// Poll the queue until the job reaches a terminal state, bounded by
/// `timeout`.
///
/// Completed jobs yield their return value. Failed jobs are classified via
/// [`AppError::from_failed_job`]. A timeout maps to [`AppError::JobTimeout`]
/// without cancelling the underlying job.
pub async fn wait_for_job<Q: JobQueue>(
    queue: &Q,
    job_id: Uuid,
    timeout: Duration,
) -> Result<Document, AppError> {
    let wait = async {
        loop {
            match queue.state(job_id).await? {
                JobState::Completed => {
                    return match queue.return_value(job_id).await? {
                        Some(document) => Ok(document),
                        None => Err(AppError::Unexpected(format!(
                            "job {job_id} completed without a return value"
                        ))),
                    };
                }
                JobState::Failed => {
                    let reason = queue
                        .get(job_id)
                        .await?
                        .and_then(|job| job.failed_reason)
                        .unwrap_or_else(|| "job failed without a reason".to_string());
                    return Err(AppError::from_failed_job(&reason));
                }
                _ => tokio::time::sleep(COMPLETION_POLL_INTERVAL).await,
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(AppError::JobTimeout),
    }
}
