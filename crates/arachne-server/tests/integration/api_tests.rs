use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use arachne_core::document::Document;
use arachne_core::error::BLOCKLISTED_URL_MESSAGE;

use crate::common::{setup_test_app, TEST_API_KEY, TEST_TEAM_CREDITS};

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn unauthenticated_scrape_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(
            Request::post("/scrape")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"url": "https://example.com"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(
            Request::post("/scrape")
                .header("authorization", "Bearer wrong-key")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"url": "https://example.com"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blocklisted_url_returns_403_with_fixed_message() {
    let app = setup_test_app().await;

    let body = serde_json::json!({"url": "https://facebook.com/somepage"});
    let response = app.router.oneshot(post_json("/scrape", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = json_body(response).await;
    assert_eq!(json["error"], BLOCKLISTED_URL_MESSAGE);
}

#[tokio::test]
async fn scrape_happy_path_returns_document() {
    let app = setup_test_app().await;

    // Simulate the external worker: complete the first waiting job.
    let db = app.db.clone();
    let worker = tokio::spawn(async move {
        let queue = db.job_queue();
        for _ in 0..200 {
            let row: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM jobs WHERE state = 'waiting' LIMIT 1")
                    .fetch_optional(db.pool())
                    .await
                    .unwrap();
            if let Some((id,)) = row {
                let document = Document {
                    markdown: Some("# Hello".to_string()),
                    ..Default::default()
                };
                queue.complete_job(id, &document).await.unwrap();
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("no waiting job appeared");
    });

    let body = serde_json::json!({"url": "https://example.com", "timeout": 10000});
    let response = app.router.oneshot(post_json("/scrape", &body)).await.unwrap();
    worker.await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["returnCode"], 200);
    assert_eq!(json["data"]["content"], "# Hello");
    // rawHtml was not requested and must be elided.
    assert!(json["data"].get("rawHtml").is_none());
}

#[tokio::test]
async fn scrape_timeout_returns_408_and_leaves_queue_entry() {
    let app = setup_test_app().await;

    let body = serde_json::json!({"url": "https://example.com", "timeout": 300});
    let response = app.router.oneshot(post_json("/scrape", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Request timed out");

    // The queue entry is left for the worker's terminal handler.
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs")
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn crawl_with_invalid_regex_returns_400_without_persisting() {
    let app = setup_test_app().await;

    let body = serde_json::json!({
        "url": "http://127.0.0.1:9/site",
        "includePaths": ["[unclosed"],
        "limit": 10
    });
    let response = app
        .router
        .oneshot(post_json("/v1/crawl", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("[unclosed"));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawls")
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn zdr_without_entitlement_returns_400_without_persisting() {
    let app = setup_test_app().await;

    let body = serde_json::json!({
        "url": "http://127.0.0.1:9/site",
        "zeroDataRetention": true
    });
    let response = app
        .router
        .oneshot(post_json("/v1/crawl", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawls")
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn crawl_kickoff_clamps_limit_and_enqueues_kickoff_job() {
    let app = setup_test_app().await;

    let body = serde_json::json!({
        "url": "http://127.0.0.1:9/site",
        "limit": 1000
    });
    let response = app
        .router
        .oneshot(post_json("/v1/crawl", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    let id = json["id"].as_str().unwrap();
    assert!(Uuid::parse_str(id).is_ok());
    assert!(json["url"]
        .as_str()
        .unwrap()
        .contains(&format!("/v1/crawl/{id}")));

    // The stored limit is clamped to the team's remaining credits.
    let (limit,): (i64,) = sqlx::query_as(
        "SELECT (record->'crawler_options'->>'limit')::bigint FROM crawls WHERE id = $1::uuid",
    )
    .bind(id)
    .fetch_one(app.db.pool())
    .await
    .unwrap();
    assert_eq!(limit, TEST_TEAM_CREDITS);

    // Exactly one kickoff job at base priority, carrying the crawl id.
    let (mode, priority, crawl_id): (String, i32, Option<Uuid>) =
        sqlx::query_as("SELECT mode, priority, crawl_id FROM jobs")
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert_eq!(mode, "kickoff");
    assert_eq!(priority, 10);
    assert_eq!(crawl_id.unwrap().to_string(), id);
}

#[tokio::test]
async fn v0_endpoint_marks_team_in_migration_set() {
    let app = setup_test_app().await;

    let body = serde_json::json!({"url": "https://facebook.com/blocked-anyway"});
    let _ = app.router.oneshot(post_json("/scrape", &body)).await.unwrap();

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM teams_using_v0 WHERE team_id = 'team-1'")
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert_eq!(count, 1);
}
