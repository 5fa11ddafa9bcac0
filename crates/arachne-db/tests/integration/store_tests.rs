use chrono::Utc;
use uuid::Uuid;

use arachne_core::crawl::{CrawlStore, StoredCrawl};
use arachne_core::document::Document;
use arachne_core::job::{JobMode, JobState};
use arachne_core::options::{CrawlerOptions, InternalOptions, ScrapeOptions};
use arachne_core::queue::JobQueue;
use arachne_core::testutil::make_test_descriptor;

use crate::common::setup_test_db;

fn stored_crawl(team_id: &str) -> StoredCrawl {
    StoredCrawl {
        origin_url: "https://example.com".to_string(),
        crawler_options: CrawlerOptions::default(),
        scrape_options: ScrapeOptions::default(),
        internal_options: InternalOptions::default(),
        team_id: team_id.to_string(),
        created_at: Utc::now(),
        max_concurrency: Some(4),
        robots: None,
        cancelled: false,
        zero_data_retention: false,
    }
}

#[tokio::test]
async fn enqueue_is_idempotent_on_job_id() {
    let handle = setup_test_db().await;
    let queue = handle.db.job_queue();

    let descriptor = make_test_descriptor("team-1");
    let job_id = Uuid::new_v4();
    queue.enqueue(&descriptor, job_id, 10).await.unwrap();
    queue.enqueue(&descriptor, job_id, 10).await.unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs")
        .fetch_one(handle.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn job_lifecycle_waiting_completed_removed() {
    let handle = setup_test_db().await;
    let queue = handle.db.job_queue();

    let job_id = Uuid::new_v4();
    queue
        .enqueue(&make_test_descriptor("team-1"), job_id, 10)
        .await
        .unwrap();
    assert_eq!(queue.state(job_id).await.unwrap(), JobState::Waiting);
    assert!(queue.return_value(job_id).await.unwrap().is_none());

    let document = Document {
        markdown: Some("# Done".to_string()),
        ..Default::default()
    };
    queue.complete_job(job_id, &document).await.unwrap();

    assert_eq!(queue.state(job_id).await.unwrap(), JobState::Completed);
    let value = queue.return_value(job_id).await.unwrap().unwrap();
    assert_eq!(value.markdown.as_deref(), Some("# Done"));

    let job = queue.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.descriptor.team_id, "team-1");
    assert_eq!(job.descriptor.mode, JobMode::SingleUrls);
    assert!(job.finished_at.is_some());

    queue.remove(job_id).await.unwrap();
    assert_eq!(queue.state(job_id).await.unwrap(), JobState::Unknown);
}

#[tokio::test]
async fn failed_jobs_keep_their_reason() {
    let handle = setup_test_db().await;
    let queue = handle.db.job_queue();

    let job_id = Uuid::new_v4();
    queue
        .enqueue(&make_test_descriptor("team-1"), job_id, 10)
        .await
        .unwrap();
    queue.fail_job(job_id, "render engine crashed").await.unwrap();

    assert_eq!(queue.state(job_id).await.unwrap(), JobState::Failed);
    let job = queue.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.failed_reason.as_deref(), Some("render engine crashed"));
    // Failed jobs have no return value.
    assert!(queue.return_value(job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_ids_report_unknown_state() {
    let handle = setup_test_db().await;
    let queue = handle.db.job_queue();

    assert_eq!(
        queue.state(Uuid::new_v4()).await.unwrap(),
        JobState::Unknown
    );
    assert!(queue.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn get_many_omits_unknown_ids() {
    let handle = setup_test_db().await;
    let queue = handle.db.job_queue();

    let known = Uuid::new_v4();
    queue
        .enqueue(&make_test_descriptor("team-1"), known, 10)
        .await
        .unwrap();

    let jobs = queue.get_many(&[known, Uuid::new_v4()]).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, known);
}

#[tokio::test]
async fn prioritized_jobs_show_in_team_throttle_set() {
    let handle = setup_test_db().await;
    let queue = handle.db.job_queue();

    let throttled = Uuid::new_v4();
    let running = Uuid::new_v4();
    queue
        .enqueue(&make_test_descriptor("team-1"), throttled, 10)
        .await
        .unwrap();
    queue
        .enqueue(&make_test_descriptor("team-1"), running, 10)
        .await
        .unwrap();
    queue.set_prioritized(throttled).await.unwrap();

    let set = queue.concurrency_limited_jobs("team-1").await.unwrap();
    assert!(set.contains(&throttled));
    assert!(!set.contains(&running));
    assert!(queue
        .concurrency_limited_jobs("team-2")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn crawl_record_roundtrip_and_cancel() {
    let handle = setup_test_db().await;
    let store = handle.db.crawl_store();

    let crawl_id = Uuid::new_v4();
    store.save_crawl(crawl_id, &stored_crawl("team-1")).await.unwrap();

    let loaded = store.get_crawl(crawl_id).await.unwrap().unwrap();
    assert_eq!(loaded.team_id, "team-1");
    assert_eq!(loaded.max_concurrency, Some(4));
    assert!(!loaded.cancelled);
    assert!(store.get_expiry(crawl_id).await.unwrap().is_some());

    store.cancel(crawl_id).await.unwrap();
    let loaded = store.get_crawl(crawl_id).await.unwrap().unwrap();
    assert!(loaded.cancelled);
    assert!(store.is_finished(crawl_id).await.unwrap());
}

#[tokio::test]
async fn done_list_preserves_order_and_dedupes() {
    let handle = setup_test_db().await;
    let store = handle.db.crawl_store();

    let crawl_id = Uuid::new_v4();
    store.save_crawl(crawl_id, &stored_crawl("team-1")).await.unwrap();

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    store.add_crawl_job(crawl_id, first).await.unwrap();
    store.add_crawl_job(crawl_id, second).await.unwrap();
    store.add_crawl_job(crawl_id, second).await.unwrap();
    assert_eq!(store.get_crawl_jobs(crawl_id).await.unwrap().len(), 2);

    store.push_done(crawl_id, first).await.unwrap();
    store.push_done(crawl_id, second).await.unwrap();
    store.push_done(crawl_id, first).await.unwrap();

    assert_eq!(store.get_done_ordered(crawl_id).await.unwrap(), vec![first, second]);
    assert_eq!(store.get_done_length(crawl_id).await.unwrap(), 2);
}

#[tokio::test]
async fn crawl_finishes_when_children_are_terminal() {
    let handle = setup_test_db().await;
    let store = handle.db.crawl_store();
    let queue = handle.db.job_queue();

    let crawl_id = Uuid::new_v4();
    store.save_crawl(crawl_id, &stored_crawl("team-1")).await.unwrap();

    let child = Uuid::new_v4();
    queue
        .enqueue(&make_test_descriptor("team-1"), child, 10)
        .await
        .unwrap();
    store.add_crawl_job(crawl_id, child).await.unwrap();

    assert!(!store.is_finished(crawl_id).await.unwrap());

    queue
        .complete_job(child, &Document::default())
        .await
        .unwrap();
    assert!(store.is_finished(crawl_id).await.unwrap());
    assert!(store.is_finished_locked(crawl_id).await.unwrap());
}

#[tokio::test]
async fn v0_team_set_is_idempotent() {
    let handle = setup_test_db().await;
    let store = handle.db.crawl_store();

    store.mark_team_v0("team-1").await.unwrap();
    store.mark_team_v0("team-1").await.unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM teams_using_v0")
        .fetch_one(handle.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}
