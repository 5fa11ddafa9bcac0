//! Crawl progress streaming: catch-up snapshot, 1 Hz delta polling, and
//! exactly-once termination, against the shared job-state store.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::crawl::CrawlStore;
use crate::document::Document;
use crate::error::AppError;
use crate::job::JobState;
use crate::queue::JobQueue;

/// Default delta-poll cadence.
const POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// Session status as reported in the catch-up frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlSessionStatus {
    Scraping,
    Completed,
    Cancelled,
}

/// Snapshot sent as the first frame of every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStatus {
    pub status: CrawlSessionStatus,
    pub total: usize,
    pub completed: usize,
    /// One credit per child URL; an approximation, not a ledger lookup.
    pub credits_used: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub data: Vec<Document>,
}

/// Server-to-client frames. Push-only; the session never reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Catchup { data: CrawlStatus },
    Document { data: Document },
    Done,
    Error { error: String },
}

/// Transport abstraction for one client session. The axum WebSocket
/// implements this; tests use a collecting sink.
pub trait FrameSink: Send {
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// One progress-streaming session bound to a crawl id.
pub struct CrawlWatcher<Q, S>
where
    Q: JobQueue,
    S: CrawlStore,
{
    queue: Q,
    store: S,
    poll_interval: Duration,
}

impl<Q, S> CrawlWatcher<Q, S>
where
    Q: JobQueue,
    S: CrawlStore,
{
    pub fn new(queue: Q, store: S) -> Self {
        Self {
            queue,
            store,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Shorten the poll cadence (tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Drive one session to completion.
    ///
    /// The catch-up frame is always the first frame sent; `Done` is sent
    /// exactly once. Returns `Ok(())` on normal termination (including
    /// client cancellation), `Err` on session rejection or transport loss.
    pub async fn run<K: FrameSink>(
        &self,
        crawl_id: Uuid,
        team_id: &str,
        sink: &mut K,
        cancel: CancellationToken,
    ) -> Result<(), AppError> {
        let Some(crawl) = self.store.get_crawl(crawl_id).await? else {
            return Err(AppError::CrawlNotFound);
        };
        if crawl.team_id != team_id {
            return Err(AppError::ForbiddenTeam);
        }

        // Session-local list of job ids already surfaced to this client.
        let mut done_job_ids = self.store.get_done_ordered(crawl_id).await?;

        let job_ids = self.store.get_crawl_jobs(crawl_id).await?;
        let throttled = self.queue.concurrency_limited_jobs(team_id).await?;

        let mut included: Vec<(Uuid, JobState)> = Vec::with_capacity(job_ids.len());
        for id in &job_ids {
            let state = if throttled.contains(id) {
                JobState::Prioritized
            } else {
                self.queue.state(*id).await?
            };
            match state {
                JobState::Failed | JobState::Unknown => {}
                state => included.push((*id, state)),
            }
        }

        let status = if crawl.cancelled {
            CrawlSessionStatus::Cancelled
        } else if included
            .iter()
            .all(|(_, state)| *state == JobState::Completed)
        {
            CrawlSessionStatus::Completed
        } else {
            CrawlSessionStatus::Scraping
        };

        let mut data = Vec::with_capacity(done_job_ids.len());
        for id in &done_job_ids {
            if let Some(document) = self.queue.return_value(*id).await? {
                data.push(document);
            }
        }

        let total = included.len();
        sink.send(Frame::Catchup {
            data: CrawlStatus {
                status,
                total,
                completed: done_job_ids.len(),
                credits_used: total,
                expires_at: self.store.get_expiry(crawl_id).await?,
                data,
            },
        })
        .await?;

        if status != CrawlSessionStatus::Scraping {
            sink.send(Frame::Done).await?;
            return Ok(());
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.poll_interval) => {}
            }

            let job_ids = self.store.get_crawl_jobs(crawl_id).await?;
            if job_ids.len() == done_job_ids.len() {
                sink.send(Frame::Done).await?;
                return Ok(());
            }

            let mut newly_done = Vec::new();
            for id in job_ids {
                if done_job_ids.contains(&id) {
                    continue;
                }
                if self.queue.state(id).await?.is_terminal() {
                    newly_done.push(id);
                }
            }

            for id in &newly_done {
                match self.queue.get(*id).await {
                    Ok(Some(job)) => {
                        if let Some(document) = job.return_value {
                            sink.send(Frame::Document { data: document }).await?;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(job_id = %id, error = %e, "Failed to load finished job");
                    }
                }
            }

            done_job_ids.extend(newly_done);
        }
    }
}
