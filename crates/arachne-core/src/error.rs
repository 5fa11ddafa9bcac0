use thiserror::Error;

/// Fixed message returned for blocklisted URLs. The exact wording is part of
/// the public API contract and must not change between releases.
pub const BLOCKLISTED_URL_MESSAGE: &str =
    "This website is not supported for scraping due to policy restrictions. \
     Please reach out to support if you believe this is a mistake.";

/// Message substrings that identify a recoverable LLM-extraction failure
/// reported by a worker. Matched verbatim against the job's failure reason.
const LLM_FAILURE_MARKERS: [&str; 3] = [
    "Error generating completions: ",
    "Invalid schema for function",
    "LLM extraction did not match the extraction schema",
];

/// Application-wide error types for Arachne.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request failed validation (bad URL, bad options, bad regex).
    #[error("{0}")]
    InvalidInput(String),

    /// Target host is on the scraping blocklist.
    #[error("{}", BLOCKLISTED_URL_MESSAGE)]
    BlocklistedUrl,

    /// Caller could not be authenticated.
    #[error("Unauthorized: {0}")]
    Unauthenticated(String),

    /// The request uses a policy flag the team is not entitled to.
    #[error("{0}")]
    ForbiddenFlag(String),

    /// Team has run out of credits.
    #[error("{0}")]
    InsufficientCredits(String),

    /// The credit check itself failed (missing chunk, account lookup error).
    #[error("Error checking team credits: {0}")]
    CreditCheckError(String),

    /// The job queue could not be reached or rejected the operation.
    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(String),

    /// The job did not reach a terminal state within the request timeout.
    #[error("Request timed out")]
    JobTimeout,

    /// Worker reported an LLM-extraction failure the client can act on.
    #[error("{0}")]
    LlmExtractionFailed(String),

    /// Crawl id does not resolve to a stored crawl (streamer path).
    #[error("Job not found")]
    CrawlNotFound,

    /// Crawl belongs to a different team (streamer path).
    #[error("Forbidden")]
    ForbiddenTeam,

    /// Persistent store operation failed.
    #[error("Store error: {0}")]
    StoreError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Anything else. Surfaced to clients as a 500 with an exception id.
    #[error("Internal error: {0}")]
    Unexpected(String),
}

impl AppError {
    /// Classify a worker-reported failure reason.
    ///
    /// LLM-extraction failures are recoverable (the client gets the message
    /// back as a 500); everything else is treated as unexpected.
    pub fn from_failed_job(reason: &str) -> Self {
        if LLM_FAILURE_MARKERS.iter().any(|m| reason.contains(m)) {
            AppError::LlmExtractionFailed(reason.to_string())
        } else {
            AppError::Unexpected(reason.to_string())
        }
    }

    /// Returns true if this error terminates a streamer session with a
    /// policy close code rather than an unexpected-error close.
    pub fn is_session_rejection(&self) -> bool {
        matches!(self, AppError::CrawlNotFound | AppError::ForbiddenTeam)
    }
}
