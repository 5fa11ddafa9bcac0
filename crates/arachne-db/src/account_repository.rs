use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};

use arachne_core::credits::{CreditChunk, TeamFlags};
use arachne_core::error::AppError;
use arachne_core::traits::{Account, AccountProvider, BillingLedger};

/// Resolves API keys against the `teams` table (DB-auth mode).
#[derive(Clone)]
pub struct PgAccountProvider {
    pool: Pool<Postgres>,
}

impl PgAccountProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TeamRow {
    team_id: String,
    credits_used: i64,
    total_credits: i64,
    sub_id: Option<String>,
    sub_period_start: Option<DateTime<Utc>>,
    sub_period_end: Option<DateTime<Utc>>,
    flags: serde_json::Value,
    concurrency: i32,
}

impl TryFrom<TeamRow> for Account {
    type Error = AppError;

    fn try_from(row: TeamRow) -> Result<Self, AppError> {
        let flags: TeamFlags = serde_json::from_value(row.flags)?;
        Ok(Account {
            team_id: row.team_id,
            chunk: CreditChunk {
                adjusted_credits_used: row.credits_used,
                remaining_credits: row.total_credits - row.credits_used,
                total_credits_sum: row.total_credits,
                sub_id: row.sub_id,
                sub_current_period_start: row.sub_period_start,
                sub_current_period_end: row.sub_period_end,
                is_extract: false,
                flags,
                concurrency: row.concurrency,
            },
        })
    }
}

impl AccountProvider for PgAccountProvider {
    async fn resolve_key(&self, api_key: &str) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, TeamRow>(
            r#"
            SELECT team_id, credits_used, total_credits, sub_id,
                   sub_period_start, sub_period_end, flags, concurrency
            FROM teams
            WHERE api_key = $1
            "#,
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StoreError(e.to_string()))?;

        row.map(Account::try_from).transpose()
    }
}

/// Billing ledger writing aggregated usage rows to `credit_usage`.
#[derive(Clone)]
pub struct PgBillingLedger {
    pool: Pool<Postgres>,
}

impl PgBillingLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl BillingLedger for PgBillingLedger {
    async fn record_usage(
        &self,
        team_id: &str,
        sub_id: Option<&str>,
        credits: u64,
        is_extract: bool,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO credit_usage (team_id, sub_id, credits, is_extract)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(team_id)
        .bind(sub_id)
        .bind(credits as i64)
        .bind(is_extract)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::StoreError(e.to_string()))?;
        Ok(())
    }
}
