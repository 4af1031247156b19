//! C11 HTTP surface: health/ready/alive, `/metrics`, and the four thin
//! on-demand/cron endpoints (§4.11). Does not run the background scrape
//! cycles itself — those live in `reddit_scraper`/`instagram_scraper`.

use std::sync::Arc;
use std::time::Duration;

use b9_ingestion_core::config::AppConfig;
use b9_ingestion_core::database::Database;
use b9_ingestion_core::services::{
    Categorizer, ControlPlane, HttpFetcher, InstagramScraper, LogCleanupJob, OpenAiClassifier, ProxyPool,
    StructuredLogger, SubredditCache, SubredditScraper,
};
use b9_ingestion_core::{create_router, AppState, MetricsCollector};
use tracing::{error, info};

const MAX_RETRIES: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    let db = Database::new(&config.database.url).await?;
    let pool = db.pool();

    let control_plane = Arc::new(ControlPlane::new(pool.clone(), "api_server", Duration::from_secs(30)));
    let proxy_pool = Arc::new(ProxyPool::new(pool.clone()));
    proxy_pool.load().await?;

    let fetcher = Arc::new(HttpFetcher::new(proxy_pool.clone(), MAX_RETRIES));
    let logger = Arc::new(StructuredLogger::new(pool.clone(), "api_server", "api_server.rs"));
    logger.clone().spawn_timer_flush();

    let subreddit_cache = Arc::new(SubredditCache::new(pool.clone()));
    subreddit_cache.refresh().await?;

    let subreddit_scraper = Arc::new(SubredditScraper::new(
        pool.clone(),
        fetcher.clone(),
        subreddit_cache.clone(),
        logger.clone(),
        control_plane.clone(),
        30,
    ));

    let metrics = Arc::new(MetricsCollector::new().map_err(|e| anyhow::anyhow!(e.to_string()))?);

    let instagram_scraper = if config.instagram.enabled() {
        match InstagramScraper::new(
            pool.clone(),
            config.instagram.rapidapi_key.clone().unwrap_or_default(),
            config.instagram.rapidapi_host.clone().unwrap_or_default(),
            config.instagram.requests_per_second as f64,
            config.instagram.retry_empty_response,
            logger.clone(),
            control_plane.clone(),
            metrics.clone(),
            config.instagram.cost_per_request,
        ) {
            Ok(s) => Some(Arc::new(s)),
            Err(e) => {
                error!(error = %e, "api_server: instagram scraper init failed, manual-add endpoint stays enabled, cycle disabled");
                None
            }
        }
    } else {
        None
    };

    let categorizer = if config.categorizer.enabled() {
        let classifier = Arc::new(OpenAiClassifier::new(config.categorizer.openai_api_key.clone().unwrap_or_default()));
        Some(Arc::new(Categorizer::new(pool.clone(), classifier)))
    } else {
        None
    };

    let log_dir = std::env::var("LOG_FILE")
        .ok()
        .and_then(|f| std::path::Path::new(&f).parent().map(|p| p.to_string_lossy().to_string()));
    let log_cleanup = Arc::new(LogCleanupJob::new(pool.clone(), log_dir));

    let state = AppState {
        db_pool: pool.clone(),
        config: config.clone(),
        proxy_pool,
        fetcher,
        subreddit_cache,
        subreddit_scraper,
        instagram_scraper,
        categorizer,
        control_plane,
        log_cleanup,
        logger,
        metrics,
    };

    let app = create_router(state);
    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "api_server: listening");
    axum::serve(listener, app).await?;
    Ok(())
}
