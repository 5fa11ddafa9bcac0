//! Credit gating: admit, price, and asynchronously bill requests against
//! per-team budgets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::billing::{BillingHandle, BillingOp};
use crate::config::AuthMode;
use crate::error::AppError;
use crate::traits::{AutoRecharger, NotificationKind, Notifier, RechargeConfig};

/// Where teams are sent when they run out of credits.
pub const UPGRADE_URL: &str = "https://arachne.dev/pricing";

/// Auto-recharge configuration cache TTL.
const RECHARGE_CONFIG_TTL: Duration = Duration::from_secs(300);

/// How many times the auth-bypass warning is emitted before going quiet.
const MAX_BYPASS_WARNINGS: u32 = 5;

/// Policy flags attached to a team. Unknown flags are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamFlags {
    #[serde(rename = "forceZDR", default)]
    pub force_zdr: bool,
    #[serde(rename = "allowZDR", default)]
    pub allow_zdr: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Snapshot of a team's billing state, loaded at authentication time.
/// Immutable within one request; refreshed between requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditChunk {
    pub adjusted_credits_used: i64,
    pub remaining_credits: i64,
    pub total_credits_sum: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_current_period_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_extract: bool,
    #[serde(default)]
    pub flags: TeamFlags,
    pub concurrency: i32,
}

/// The authenticated caller as seen by dispatch and kickoff.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub team_id: String,
    pub chunk: Option<CreditChunk>,
}

impl AuthContext {
    pub fn flags(&self) -> TeamFlags {
        self.chunk
            .as_ref()
            .map(|c| c.flags.clone())
            .unwrap_or_default()
    }
}

/// Teams that are never credit-accounted: the preview sandbox and
/// environment (allow-list) teams.
pub fn is_preview_team(team_id: &str) -> bool {
    team_id == "preview" || team_id.starts_with("preview_") || team_id.starts_with("env_")
}

/// Outcome of a credit check.
#[derive(Debug, Clone)]
pub struct CreditCheck {
    pub admitted: bool,
    /// Credits left after admission; `None` means unlimited.
    pub remaining: Option<i64>,
    /// Refreshed chunk, present when an auto-recharge updated the snapshot.
    pub chunk: Option<CreditChunk>,
    pub message: Option<String>,
}

impl CreditCheck {
    fn unlimited() -> Self {
        Self {
            admitted: true,
            remaining: None,
            chunk: None,
            message: None,
        }
    }

    fn admitted(remaining: i64) -> Self {
        Self {
            admitted: true,
            remaining: Some(remaining.max(0)),
            chunk: None,
            message: None,
        }
    }

    fn denied(remaining: i64) -> Self {
        Self {
            admitted: false,
            remaining: Some(remaining.max(0)),
            chunk: None,
            message: Some(format!(
                "Insufficient credits to perform this request. For more credits, \
                 you can upgrade your plan at {UPGRADE_URL}"
            )),
        }
    }
}

/// Process-local TTL cache for per-team auto-recharge configuration.
/// Races between readers are tolerated; last writer wins.
struct RechargeConfigCache {
    entries: Mutex<HashMap<String, (RechargeConfig, Instant)>>,
    ttl: Duration,
}

impl RechargeConfigCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    async fn get(&self, key: &str) -> Option<RechargeConfig> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(config, _)| *config)
    }

    async fn insert(&self, key: String, config: RechargeConfig) {
        let mut entries = self.entries.lock().await;
        entries.insert(key, (config, Instant::now()));
    }
}

/// The credit gate: checks admissions and fans billing out to the
/// asynchronous aggregator.
pub struct CreditGate<N, R>
where
    N: Notifier,
    R: AutoRecharger,
{
    auth_mode: AuthMode,
    notifier: N,
    recharger: R,
    billing: BillingHandle,
    recharge_cache: RechargeConfigCache,
    bypass_warnings: AtomicU32,
}

impl<N, R> CreditGate<N, R>
where
    N: Notifier,
    R: AutoRecharger,
{
    pub fn new(auth_mode: AuthMode, notifier: N, recharger: R, billing: BillingHandle) -> Self {
        Self {
            auth_mode,
            notifier,
            recharger,
            billing,
            recharge_cache: RechargeConfigCache::new(RECHARGE_CONFIG_TTL),
            bypass_warnings: AtomicU32::new(0),
        }
    }

    /// Check whether `team_id` may spend `credits` right now.
    ///
    /// Denials are returned as an unadmitted [`CreditCheck`], not an error;
    /// `Err` means the check itself could not be performed.
    pub async fn check(
        &self,
        team_id: &str,
        chunk: Option<&CreditChunk>,
        credits: u64,
    ) -> Result<CreditCheck, AppError> {
        if is_preview_team(team_id) {
            return Ok(CreditCheck::unlimited());
        }

        match &self.auth_mode {
            AuthMode::Disabled => {
                self.warn_bypass();
                return Ok(CreditCheck::unlimited());
            }
            AuthMode::AllowList(_) => return Ok(CreditCheck::unlimited()),
            AuthMode::DbAuth => {}
        }

        let Some(chunk) = chunk else {
            return Err(AppError::CreditCheckError(format!(
                "no credit chunk loaded for team {team_id}"
            )));
        };

        let used = chunk.adjusted_credits_used;
        let total = chunk.total_credits_sum;
        let will_use = used + credits as i64;
        let usage_ratio = if total > 0 {
            used as f64 / total as f64
        } else {
            f64::INFINITY
        };

        let recharge = self.recharge_config(team_id).await;
        if recharge.enabled && chunk.remaining_credits < recharge.threshold && !chunk.is_extract {
            match self.recharger.attempt(team_id).await {
                Ok(Some(refreshed)) => {
                    let remaining = refreshed.remaining_credits;
                    return Ok(CreditCheck {
                        admitted: true,
                        remaining: Some(remaining.max(0)),
                        chunk: Some(refreshed),
                        message: None,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(team_id = %team_id, error = %e, "Auto-recharge attempt failed");
                }
            }
        }

        if will_use > total {
            if used > total {
                self.notify(team_id, NotificationKind::LimitReached).await;
            }
            return Ok(CreditCheck::denied(chunk.remaining_credits));
        }

        if (0.8..1.0).contains(&usage_ratio) {
            self.notify(team_id, NotificationKind::ApproachingLimit).await;
        }

        Ok(CreditCheck::admitted(total - will_use))
    }

    /// Bill credits asynchronously. Never blocks, never fails the caller.
    pub fn bill(&self, team_id: &str, sub_id: Option<&str>, credits: u64, is_extract: bool) {
        if is_preview_team(team_id) || !self.auth_mode.is_db_auth() {
            return;
        }
        self.billing.enqueue(BillingOp {
            team_id: team_id.to_string(),
            sub_id: sub_id.map(str::to_string),
            credits,
            is_extract,
        });
    }

    async fn recharge_config(&self, team_id: &str) -> RechargeConfig {
        let key = format!("team_auto_recharge_{team_id}");
        if let Some(config) = self.recharge_cache.get(&key).await {
            return config;
        }
        match self.recharger.config(team_id).await {
            Ok(config) => {
                self.recharge_cache.insert(key, config).await;
                config
            }
            Err(e) => {
                tracing::warn!(team_id = %team_id, error = %e, "Failed to load auto-recharge config");
                RechargeConfig::default()
            }
        }
    }

    async fn notify(&self, team_id: &str, kind: NotificationKind) {
        if let Err(e) = self.notifier.notify(team_id, kind).await {
            tracing::warn!(team_id = %team_id, ?kind, error = %e, "Failed to deliver usage notification");
        }
    }

    fn warn_bypass(&self) {
        let seen = self.bypass_warnings.fetch_add(1, Ordering::Relaxed);
        if seen < MAX_BYPASS_WARNINGS {
            tracing::warn!(
                "Authentication is disabled; admitting request without credit accounting"
            );
        }
    }
}
