use std::collections::HashSet;
use std::future::Future;

use uuid::Uuid;

use crate::document::Document;
use crate::error::AppError;
use crate::job::{Job, JobDescriptor, JobState};

/// Gateway to the priority job queue.
///
/// Implementations must make `enqueue` idempotent on the job id: at most one
/// enqueue with a given id succeeds, retries of the same id are no-ops.
/// Transport failures surface as [`AppError::QueueUnavailable`].
pub trait JobQueue: Send + Sync + Clone {
    /// Submit a job with a stable id. Lower priority values run first.
    fn enqueue(
        &self,
        descriptor: &JobDescriptor,
        job_id: Uuid,
        priority: i32,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Observable state; `Unknown` for ids the queue has no record of.
    fn state(&self, job_id: Uuid) -> impl Future<Output = Result<JobState, AppError>> + Send;

    fn get(&self, job_id: Uuid) -> impl Future<Output = Result<Option<Job>, AppError>> + Send;

    /// Fetch many jobs at once; ids with no record are omitted.
    fn get_many(&self, ids: &[Uuid]) -> impl Future<Output = Result<Vec<Job>, AppError>> + Send;

    /// The job's return value. Only `completed` jobs have one.
    fn return_value(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<Document>, AppError>> + Send;

    /// Delete a terminal job's artifacts.
    fn remove(&self, job_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Ids currently held back by the team's concurrency cap.
    fn concurrency_limited_jobs(
        &self,
        team_id: &str,
    ) -> impl Future<Output = Result<HashSet<Uuid>, AppError>> + Send;
}
