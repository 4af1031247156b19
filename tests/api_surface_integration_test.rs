//! Exercises the C11 HTTP surface end to end against a real Postgres, the
//! way the router is actually assembled in `src/bin/api_server.rs`.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use b9_ingestion_core::config::{AppConfig, CategorizerConfig, CronConfig, DatabaseSettings, Environment, InstagramConfig, RedisSettings, ServerConfig};
use b9_ingestion_core::services::{ControlPlane, HttpFetcher, LogCleanupJob, ProxyPool, StructuredLogger, SubredditCache, SubredditScraper};
use b9_ingestion_core::{create_router, AppState, MetricsCollector};
use common::TestDatabase;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn test_app(db: &TestDatabase) -> axum::Router {
    let pool = db.pool.clone();

    let control_plane = Arc::new(ControlPlane::new(pool.clone(), "api_server", Duration::from_secs(30)));
    let proxy_pool = Arc::new(ProxyPool::new(pool.clone()));
    proxy_pool.load().await.unwrap();

    let fetcher = Arc::new(HttpFetcher::new(proxy_pool.clone(), 3));
    let logger = Arc::new(StructuredLogger::new(pool.clone(), "api_server", "test"));
    let subreddit_cache = Arc::new(SubredditCache::new(pool.clone()));
    subreddit_cache.refresh().await.unwrap();

    let subreddit_scraper = Arc::new(SubredditScraper::new(
        pool.clone(),
        fetcher.clone(),
        subreddit_cache.clone(),
        logger.clone(),
        control_plane.clone(),
        30,
    ));

    let log_cleanup = Arc::new(LogCleanupJob::new(pool.clone(), None));
    let metrics = Arc::new(MetricsCollector::new().unwrap());

    let config = Arc::new(AppConfig {
        environment: Environment::Development,
        server: ServerConfig { host: "127.0.0.1".to_string(), port: 0, request_timeout: Duration::from_secs(30) },
        database: DatabaseSettings { url: String::new(), max_connections: 5, connection_timeout: Duration::from_secs(5) },
        redis: RedisSettings { url: "redis://localhost:6379".to_string(), max_size: 10 },
        cron: CronConfig { secret: "test-secret".to_string() },
        instagram: InstagramConfig {
            rapidapi_key: None,
            rapidapi_host: None,
            requests_per_second: 55,
            concurrent_creators: 10,
            retry_empty_response: 2,
            cost_per_request: 0.001,
        },
        categorizer: CategorizerConfig { openai_api_key: None },
    });

    let state = AppState {
        db_pool: pool,
        config,
        proxy_pool,
        fetcher,
        subreddit_cache,
        subreddit_scraper,
        instagram_scraper: None,
        categorizer: None,
        control_plane,
        log_cleanup,
        logger,
        metrics,
    };

    create_router(state)
}

#[tokio::test]
async fn health_reports_ok_with_reachable_database() {
    let db = TestDatabase::new().await;
    let app = test_app(&db).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn instagram_creator_add_then_duplicate_conflicts() {
    let db = TestDatabase::new().await;
    let app = test_app(&db).await;

    let body = serde_json::json!({ "username": "creator_one", "ig_user_id": "1234", "niche": "fitness" });

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/instagram/creator")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/instagram/creator")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cron_cleanup_rejects_missing_bearer_token() {
    let db = TestDatabase::new().await;
    let app = test_app(&db).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cron/cleanup-logs")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({ "retention_days": 30 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
