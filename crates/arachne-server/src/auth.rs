use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use arachne_core::config::AuthMode;
use arachne_core::credits::AuthContext;
use arachne_core::error::AppError;
use arachne_core::traits::AccountProvider;

use crate::error::ApiError;
use crate::state::AppState;

/// Middleware that resolves `Authorization: Bearer <key>` to an
/// [`AuthContext`] and stashes it in request extensions.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers());
    match resolve_auth(&state, token.as_deref()).await {
        Ok(auth) => {
            request.extensions_mut().insert(auth);
            next.run(request).await
        }
        Err(err) => ApiError(err).into_response(),
    }
}

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

/// Resolve a bearer token to an authenticated caller per the configured
/// auth mode. Shared by the HTTP middleware and the WebSocket handshake.
pub async fn resolve_auth(
    state: &AppState,
    token: Option<&str>,
) -> Result<AuthContext, AppError> {
    match &state.config.auth_mode {
        AuthMode::Disabled => Ok(AuthContext {
            team_id: "preview".to_string(),
            chunk: None,
        }),
        AuthMode::AllowList(keys) => {
            let token = token.ok_or_else(missing_header)?;
            if !keys.iter().any(|key| key == token) {
                return Err(AppError::Unauthenticated("Invalid API key".to_string()));
            }
            // Allow-list keys map to synthetic, non-accounted env teams.
            let prefix: String = token.chars().take(8).collect();
            Ok(AuthContext {
                team_id: format!("env_{prefix}"),
                chunk: None,
            })
        }
        AuthMode::DbAuth => {
            let token = token.ok_or_else(missing_header)?;
            if token == "preview" {
                return Ok(AuthContext {
                    team_id: "preview".to_string(),
                    chunk: None,
                });
            }
            match state.db.account_provider().resolve_key(token).await? {
                Some(account) => Ok(AuthContext {
                    team_id: account.team_id,
                    chunk: Some(account.chunk),
                }),
                None => Err(AppError::Unauthenticated("Invalid API key".to_string())),
            }
        }
    }
}

fn missing_header() -> AppError {
    AppError::Unauthenticated(
        "Missing Authorization header. Expected: Bearer <api_key>".to_string(),
    )
}
