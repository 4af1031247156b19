//! B9 Ingestion Core: Reddit + Instagram scraping pipeline shared by three
//! binaries (`reddit_scraper`, `instagram_scraper`, `api_server`). This crate
//! wires `AppState` and the C11 HTTP surface; the scraper supervisor loops
//! live in `src/bin/`.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use database::Database;
pub use error::{CoreError, Result};
pub use metrics::MetricsCollector;

use middleware::cors::create_cors_layer;
use middleware::latency::latency_middleware;
use middleware::tracing::tracing_middleware;
use services::{
    Categorizer, ControlPlane, HttpFetcher, InstagramScraper, LogCleanupJob, ProxyPool, StructuredLogger,
    SubredditCache, SubredditScraper,
};

/// Shared application state for the `api_server` binary. The two long-running
/// scraper binaries build their own narrower context in `src/bin/` rather than
/// reusing this struct, since they have no HTTP surface to serve.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<AppConfig>,
    pub proxy_pool: Arc<ProxyPool>,
    pub fetcher: Arc<HttpFetcher>,
    pub subreddit_cache: Arc<SubredditCache>,
    pub subreddit_scraper: Arc<SubredditScraper>,
    pub instagram_scraper: Option<Arc<InstagramScraper>>,
    pub categorizer: Option<Arc<Categorizer>>,
    pub control_plane: Arc<ControlPlane>,
    pub log_cleanup: Arc<LogCleanupJob>,
    pub logger: Arc<StructuredLogger>,
    pub metrics: Arc<MetricsCollector>,
}

impl axum::extract::FromRef<AppState> for Arc<MetricsCollector> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

/// C11's route table (§4.11), layered with CORS (any origin, §6), gzip
/// compression, tracing, and the `X-Process-Time`/`X-Server` latency layer —
/// the same `ServiceBuilder` stacking order the teacher's `create_router` uses.
pub fn create_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/alive", get(handlers::health::liveness_check))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/api/subreddits/fetch-single", post(handlers::subreddits::fetch_single))
        .route("/api/instagram/creator", post(handlers::instagram::add_creator))
        .route("/api/cron/cleanup-logs", post(handlers::cron::cleanup_logs))
        .route("/api/categorization/start", post(handlers::categorization::start_categorization))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer())
                .layer(CompressionLayer::new())
                .layer(axum::middleware::from_fn(tracing_middleware))
                .layer(axum::middleware::from_fn_with_state(metrics, latency_middleware)),
        )
        .with_state(state)
}
