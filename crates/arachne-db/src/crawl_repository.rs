use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use arachne_core::crawl::{CrawlStore, StoredCrawl};
use arachne_core::error::AppError;

/// Default crawl record TTL: 24 hours from last activity.
pub const DEFAULT_CRAWL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// PostgreSQL-backed crawl state store.
///
/// The crawl record is stored as JSONB; the `cancelled` flag lives in its
/// own column so cancellation does not rewrite the record. `expires_at` is
/// refreshed on every activity.
#[derive(Clone)]
pub struct PgCrawlStore {
    pool: Pool<Postgres>,
    ttl: chrono::Duration,
}

impl PgCrawlStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_ttl(pool, DEFAULT_CRAWL_TTL)
    }

    pub fn with_ttl(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24)),
        }
    }

    fn next_expiry(&self) -> DateTime<Utc> {
        Utc::now() + self.ttl
    }

    async fn touch(&self, crawl_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE crawls SET expires_at = $2 WHERE id = $1")
            .bind(crawl_id)
            .bind(self.next_expiry())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

fn store_err(e: sqlx::Error) -> AppError {
    AppError::StoreError(e.to_string())
}

impl CrawlStore for PgCrawlStore {
    async fn save_crawl(&self, crawl_id: Uuid, stored: &StoredCrawl) -> Result<(), AppError> {
        let record = serde_json::to_value(stored)?;
        sqlx::query(
            r#"
            INSERT INTO crawls (id, record, cancelled, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET record = EXCLUDED.record, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(crawl_id)
        .bind(record)
        .bind(stored.cancelled)
        .bind(self.next_expiry())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_crawl(&self, crawl_id: Uuid) -> Result<Option<StoredCrawl>, AppError> {
        let row: Option<(serde_json::Value, bool)> =
            sqlx::query_as("SELECT record, cancelled FROM crawls WHERE id = $1")
                .bind(crawl_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;

        row.map(|(record, cancelled)| {
            let mut stored: StoredCrawl = serde_json::from_value(record)?;
            stored.cancelled = cancelled;
            Ok(stored)
        })
        .transpose()
    }

    async fn add_crawl_job(&self, crawl_id: Uuid, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO crawl_jobs (crawl_id, job_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(crawl_id)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        self.touch(crawl_id).await
    }

    async fn get_crawl_jobs(&self, crawl_id: Uuid) -> Result<HashSet<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT job_id FROM crawl_jobs WHERE crawl_id = $1")
                .bind(crawl_id)
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn push_done(&self, crawl_id: Uuid, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO crawl_done_jobs (crawl_id, job_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(crawl_id)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        self.touch(crawl_id).await
    }

    async fn get_done_ordered(&self, crawl_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT job_id FROM crawl_done_jobs WHERE crawl_id = $1 ORDER BY seq",
        )
        .bind(crawl_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn get_done_length(&self, crawl_id: Uuid) -> Result<usize, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM crawl_done_jobs WHERE crawl_id = $1")
                .bind(crawl_id)
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(count as usize)
    }

    async fn is_finished(&self, crawl_id: Uuid) -> Result<bool, AppError> {
        let row: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT c.cancelled OR (
                EXISTS (SELECT 1 FROM crawl_jobs cj WHERE cj.crawl_id = c.id)
                AND NOT EXISTS (
                    SELECT 1 FROM crawl_jobs cj
                    JOIN jobs j ON j.id = cj.job_id
                    WHERE cj.crawl_id = c.id
                      AND j.state IN ('waiting', 'active', 'delayed')
                )
            )
            FROM crawls c WHERE c.id = $1
            "#,
        )
        .bind(crawl_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(|(finished,)| finished).unwrap_or(false))
    }

    async fn is_finished_locked(&self, crawl_id: Uuid) -> Result<bool, AppError> {
        // Advisory transaction lock serializes finalization: only one caller
        // at a time observes the finished transition.
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let (locked,): (bool,) =
            sqlx::query_as("SELECT pg_try_advisory_xact_lock(hashtextextended($1::text, 0))")
                .bind(crawl_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(store_err)?;

        if !locked {
            tx.rollback().await.map_err(store_err)?;
            return Ok(false);
        }

        let finished = self.is_finished(crawl_id).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(finished)
    }

    async fn get_expiry(&self, crawl_id: Uuid) -> Result<Option<DateTime<Utc>>, AppError> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT expires_at FROM crawls WHERE id = $1")
                .bind(crawl_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(row.map(|(at,)| at))
    }

    async fn cancel(&self, crawl_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE crawls SET cancelled = TRUE WHERE id = $1")
            .bind(crawl_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn mark_team_v0(&self, team_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO teams_using_v0 (team_id)
            VALUES ($1)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(team_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}
