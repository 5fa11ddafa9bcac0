/// Runtime configuration derived from the environment.
///
/// Recognized variables:
/// - `USE_DB_AUTHENTICATION` — `"true"` activates DB credit accounting
/// - `ALLOWED_KEYS` — comma-separated allow-list, enables allow-list mode
///   when DB auth is off
/// - `GCS_FIRE_ENGINE_BUCKET_NAME` — enables mirroring scrape results to GCS
/// - `ENV` — `"local"` keeps the request protocol in generated URLs
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub auth_mode: AuthMode,
    pub environment: Environment,
    pub gcs_bucket: Option<String>,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            auth_mode: AuthMode::resolve(
                std::env::var("USE_DB_AUTHENTICATION").ok().as_deref(),
                std::env::var("ALLOWED_KEYS").ok().as_deref(),
            ),
            environment: Environment::resolve(std::env::var("ENV").ok().as_deref()),
            gcs_bucket: std::env::var("GCS_FIRE_ENGINE_BUCKET_NAME")
                .ok()
                .filter(|b| !b.is_empty()),
        }
    }
}

/// How callers are authenticated and credit-accounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Full DB-backed accounts: API keys resolve to teams with credit chunks.
    DbAuth,
    /// Static key allow-list; matching keys map to synthetic `env_` teams.
    AllowList(Vec<String>),
    /// No authentication configured. Development mode: everything admitted.
    Disabled,
}

impl AuthMode {
    pub fn resolve(use_db_authentication: Option<&str>, allowed_keys: Option<&str>) -> Self {
        if use_db_authentication == Some("true") {
            return AuthMode::DbAuth;
        }
        let keys: Vec<String> = allowed_keys
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        if keys.is_empty() {
            AuthMode::Disabled
        } else {
            AuthMode::AllowList(keys)
        }
    }

    pub fn is_db_auth(&self) -> bool {
        matches!(self, AuthMode::DbAuth)
    }
}

/// Deployment environment; controls the protocol used in generated URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn resolve(env: Option<&str>) -> Self {
        match env {
            Some("local") => Environment::Local,
            _ => Environment::Production,
        }
    }

    /// Protocol for generated URLs: local deployments keep the request
    /// protocol, everything else is forced to https.
    pub fn url_protocol<'a>(&self, request_protocol: &'a str) -> &'a str {
        match self {
            Environment::Local => request_protocol,
            Environment::Production => "https",
        }
    }
}
