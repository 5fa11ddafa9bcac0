use std::sync::Arc;

use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use arachne_core::billing::BillingAggregator;
use arachne_core::config::RuntimeConfig;
use arachne_db::{Database, DatabaseConfig};
use arachne_server::routes;
use arachne_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("arachne=info".parse()?))
        .with_target(false)
        .init();

    let config = RuntimeConfig::from_env();
    let port = std::env::var("ARACHNE_SERVER_PORT").unwrap_or_else(|_| "3002".to_string());
    let addr = format!("0.0.0.0:{port}");

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    tracing::info!(auth_mode = ?config.auth_mode, "Authentication configured");
    if config.gcs_bucket.is_some() {
        tracing::info!("GCS result mirroring: enabled");
    }

    let billing_cancel = CancellationToken::new();
    let (billing, billing_task) =
        BillingAggregator::spawn(db.billing_ledger(), billing_cancel.clone());

    let state = Arc::new(AppState::build(db, config, billing)?);

    let cors = match std::env::var("ARACHNE_CORS_ORIGIN") {
        Ok(origin) if origin == "*" => CorsLayer::permissive(),
        Ok(origin) => {
            let origins: Vec<HeaderValue> = origin
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new().allow_origin(AllowOrigin::list(origins))
        }
        Err(_) => CorsLayer::new(),
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush any buffered billing operations before exiting.
    billing_cancel.cancel();
    let _ = billing_task.await;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    tracing::info!("Shutdown signal received");
}
