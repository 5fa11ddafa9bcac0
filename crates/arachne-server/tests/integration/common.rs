use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use arachne_core::billing::BillingHandle;
use arachne_core::config::{AuthMode, Environment, RuntimeConfig};
use arachne_db::Database;
use arachne_server::routes;
use arachne_server::state::AppState;

pub const TEST_API_KEY: &str = "test-secret-key";

/// Credits seeded for the test team.
pub const TEST_TEAM_CREDITS: i64 = 50;

/// Test app handle that keeps the database container alive.
pub struct TestApp {
    pub router: Router,
    pub db: Database,
    _container: ContainerAsync<GenericImage>,
}

/// Spin up a PostgreSQL container, migrate, seed one team, and return the
/// app wired in DB-auth mode.
pub async fn setup_test_app() -> TestApp {
    let container = start_postgres().await;
    let pool = connect_to_container(&container).await;
    let db = Database::from_pool(pool);
    db.migrate().await.expect("Failed to run migrations");
    seed_team(db.pool()).await;

    let config = RuntimeConfig {
        auth_mode: AuthMode::DbAuth,
        environment: Environment::Local,
        gcs_bucket: None,
    };
    let state = Arc::new(
        AppState::build(db.clone(), config, BillingHandle::disconnected())
            .expect("Failed to build app state"),
    );

    TestApp {
        router: routes::router(state),
        db,
        _container: container,
    }
}

async fn seed_team(pool: &PgPool) {
    sqlx::query(
        r#"
        INSERT INTO teams (team_id, api_key, credits_used, total_credits, flags, concurrency)
        VALUES ('team-1', $1, 0, $2, '{"allowZDR": false}', 8)
        "#,
    )
    .bind(TEST_API_KEY)
    .bind(TEST_TEAM_CREDITS)
    .execute(pool)
    .await
    .expect("Failed to seed team");
}

async fn start_postgres() -> ContainerAsync<GenericImage> {
    GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "arachne_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container")
}

async fn connect_to_container(container: &ContainerAsync<GenericImage>) -> PgPool {
    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/arachne_test");
    retry_connect(&url).await
}

async fn retry_connect(url: &str) -> PgPool {
    let mut delay = std::time::Duration::from_millis(100);
    let max_delay = std::time::Duration::from_secs(2);
    let mut last_err = None;

    for _ in 0..60 {
        match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => return pool,
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, max_delay);
            }
        }
    }
    panic!(
        "Failed to connect to test database at {url}: {:?}",
        last_err
    );
}
