use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use arachne_core::document::Document;
use arachne_core::error::AppError;
use arachne_core::job::{Job, JobDescriptor, JobState};
use arachne_core::queue::JobQueue;

/// PostgreSQL-backed job queue gateway.
///
/// Enqueues are idempotent on the job id (`ON CONFLICT DO NOTHING`);
/// terminal transitions are written by workers through
/// [`PgJobQueue::complete_job`] / [`PgJobQueue::fail_job`].
#[derive(Clone)]
pub struct PgJobQueue {
    pool: Pool<Postgres>,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Worker-side: record a successful completion with its return value.
    pub async fn complete_job(&self, job_id: Uuid, document: &Document) -> Result<(), AppError> {
        let value = serde_json::to_value(document)?;
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed', return_value = $2, failed_reason = NULL,
                finished_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;
        Ok(())
    }

    /// Worker-side: record a permanent failure.
    pub async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed', failed_reason = $2,
                finished_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;
        Ok(())
    }

    /// Mark a job as held back by its team's concurrency cap.
    pub async fn set_prioritized(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'prioritized', updated_at = NOW()
            WHERE id = $1 AND state = 'waiting'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;
        Ok(())
    }
}

fn queue_err(e: sqlx::Error) -> AppError {
    AppError::QueueUnavailable(e.to_string())
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    state: String,
    priority: i32,
    descriptor: serde_json::Value,
    return_value: Option<serde_json::Value>,
    failed_reason: Option<String>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, AppError> {
        let descriptor: JobDescriptor = serde_json::from_value(row.descriptor)?;
        let return_value: Option<Document> = row
            .return_value
            .map(serde_json::from_value)
            .transpose()?;
        Ok(Job {
            id: row.id,
            descriptor,
            state: row.state.parse().unwrap_or(JobState::Unknown),
            priority: row.priority,
            created_at: row.created_at,
            finished_at: row.finished_at,
            return_value,
            failed_reason: row.failed_reason,
        })
    }
}

const JOB_COLUMNS: &str =
    "id, state, priority, descriptor, return_value, failed_reason, created_at, finished_at";

impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        descriptor: &JobDescriptor,
        job_id: Uuid,
        priority: i32,
    ) -> Result<(), AppError> {
        let payload = serde_json::to_value(descriptor)?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, url, mode, team_id, crawl_id, priority, state, descriptor)
            VALUES ($1, $2, $3, $4, $5, $6, 'waiting', $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(&descriptor.url)
        .bind(descriptor.mode.as_str())
        .bind(&descriptor.team_id)
        .bind(descriptor.crawl_id)
        .bind(priority)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;
        Ok(())
    }

    async fn state(&self, job_id: Uuid) -> Result<JobState, AppError> {
        let state: Option<(String,)> = sqlx::query_as("SELECT state FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(queue_err)?;

        Ok(state
            .map(|(s,)| s.parse().unwrap_or(JobState::Unknown))
            .unwrap_or(JobState::Unknown))
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, AppError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(queue_err)?;

        row.map(Job::try_from).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Job>, AppError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(queue_err)?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn return_value(&self, job_id: Uuid) -> Result<Option<Document>, AppError> {
        let row: Option<(Option<serde_json::Value>,)> = sqlx::query_as(
            "SELECT return_value FROM jobs WHERE id = $1 AND state = 'completed'",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(queue_err)?;

        row.and_then(|(value,)| value)
            .map(|value| serde_json::from_value(value).map_err(AppError::from))
            .transpose()
    }

    async fn remove(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM jobs WHERE id = $1 AND state IN ('completed', 'failed')")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    async fn concurrency_limited_jobs(&self, team_id: &str) -> Result<HashSet<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM jobs WHERE team_id = $1 AND state = 'prioritized'")
                .bind(team_id)
                .fetch_all(&self.pool)
                .await
                .map_err(queue_err)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
