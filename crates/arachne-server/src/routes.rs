use std::sync::Arc;

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use arachne_core::credits::AuthContext;
use arachne_core::CrawlStore;
use arachne_core::dispatch::ScrapeRequest;
use arachne_core::kickoff::CrawlRequest;

use crate::auth::{authenticate, bearer_token, resolve_auth};
use crate::dto::{
    CrawlApiRequest, CrawlApiResponse, HealthResponse, ScrapeApiRequest, ScrapeApiResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::ws;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/scrape", post(scrape))
        .route("/v1/crawl", post(crawl))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let public = Router::new()
        .route("/health", get(health))
        // The WebSocket handshake carries its own auth so failures map to
        // the 3000 close code instead of an HTTP 401.
        .route("/v1/crawl/{job_id}", get(crawl_progress))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/scrape",
    request_body = ScrapeApiRequest,
    responses(
        (status = 200, description = "Scrape finished", body = ScrapeApiResponse),
        (status = 400, description = "Invalid input", body = crate::dto::ErrorResponse),
        (status = 402, description = "Insufficient credits", body = crate::dto::ErrorResponse),
        (status = 403, description = "Blocklisted URL", body = crate::dto::ErrorResponse),
        (status = 408, description = "Request timed out", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "scrape"
)]
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(body): axum::Json<ScrapeApiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Err(e) = state.db.crawl_store().mark_team_v0(&auth.team_id).await {
        tracing::warn!(team_id = %auth.team_id, error = %e, "Failed to mark v0 team");
    }

    let request = ScrapeRequest {
        url: body.url,
        page_options: body.page_options,
        extractor_options: body.extractor_options,
        timeout_ms: body.timeout,
        origin: body.origin,
        integration: body.integration,
    };

    let outcome = state.dispatcher.scrape(request, &auth).await?;

    Ok(axum::Json(ScrapeApiResponse {
        success: true,
        data: outcome.document,
        return_code: 200,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/crawl",
    request_body = CrawlApiRequest,
    responses(
        (status = 200, description = "Crawl started", body = CrawlApiResponse),
        (status = 400, description = "Invalid input", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "crawl"
)]
pub async fn crawl(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CrawlApiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = CrawlRequest {
        url: body.url,
        scrape_options: body.scrape_options.unwrap_or_default().into(),
        include_paths: body.include_paths,
        exclude_paths: body.exclude_paths,
        limit: body.limit,
        max_concurrency: body.max_concurrency,
        crawl_delay: body.crawl_delay,
        webhook: body.webhook.map(Into::into),
        zero_data_retention: body.zero_data_retention,
        origin: body.origin,
    };

    let created = state.kickoff.crawl(request, &auth).await?;

    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost:3002");
    let protocol = state.config.environment.url_protocol("http");

    Ok(axum::Json(CrawlApiResponse {
        success: true,
        id: created.crawl_id,
        url: format!("{protocol}://{host}/v1/crawl/{}", created.crawl_id),
    }))
}

/// WebSocket upgrade for crawl progress streaming.
pub async fn crawl_progress(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let auth = resolve_auth(&state, bearer_token(&headers).as_deref()).await;
    upgrade.on_upgrade(move |socket| ws::handle_session(state, socket, job_id, auth))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match state.db.health_check().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if db_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        },
        database: db_status,
    };

    (status, axum::Json(response))
}
