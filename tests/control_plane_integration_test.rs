//! Exercises the control plane and log cleanup against a real Postgres
//! instance instead of the in-memory `ControlRow` fixtures in the unit tests.

mod common;

use b9_ingestion_core::services::{ControlPlane, LogCleanupJob};
use common::TestDatabase;
use std::time::Duration;

/// §8 S6: disabling a scraper's `system_control` row between heartbeats makes
/// `heartbeat()` return `false` and flips `should_continue()` — the signal
/// the supervisor loop uses to stop picking up new work.
#[tokio::test]
async fn heartbeat_observes_external_disable() {
    let db = TestDatabase::new().await;
    let plane = ControlPlane::new(db.pool.clone(), "reddit_scraper", Duration::from_secs(30));

    plane.mark_starting().await.unwrap();
    plane.mark_running().await.unwrap();
    assert!(plane.heartbeat().await.unwrap());
    assert!(plane.should_continue());

    sqlx::query("UPDATE system_control SET enabled = false WHERE scraper_name = $1")
        .bind("reddit_scraper")
        .execute(&db.pool)
        .await
        .unwrap();

    assert!(!plane.heartbeat().await.unwrap());
    assert!(!plane.should_continue());

    plane.mark_stopping().await.unwrap();
    plane.mark_stopped().await.unwrap();

    let row = plane.read_row().await.unwrap();
    assert_eq!(row.status.to_string(), "stopped");
}

/// §8 S7: rows older than the retention window are deleted, rows inside it survive.
#[tokio::test]
async fn log_cleanup_respects_retention_window() {
    let db = TestDatabase::new().await;

    sqlx::query(
        "INSERT INTO system_logs (timestamp, source, script_name, level, message) \
         VALUES (now() - interval '40 days', 'reddit_scraper', 'main.rs', 'info', 'old entry')",
    )
    .execute(&db.pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO system_logs (timestamp, source, script_name, level, message) \
         VALUES (now() - interval '1 day', 'reddit_scraper', 'main.rs', 'info', 'recent entry')",
    )
    .execute(&db.pool)
    .await
    .unwrap();

    let job = LogCleanupJob::new(db.pool.clone(), None);
    let summary = job.run(30).await.unwrap();
    assert_eq!(summary.deleted_rows, 1);

    let remaining: i64 = sqlx::query_scalar("SELECT count(*) FROM system_logs")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}
