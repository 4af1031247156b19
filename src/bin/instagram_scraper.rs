//! Long-running supervisor for C8 (Instagram Scraper) (§4.5, §5, §4.8).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use b9_ingestion_core::config::AppConfig;
use b9_ingestion_core::database::Database;
use b9_ingestion_core::error::CoreError;
use b9_ingestion_core::metrics::MetricsCollector;
use b9_ingestion_core::services::{ConfigStore, ControlPlane, InstagramScraper, StructuredLogger};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = AppConfig::from_env()?;
    if !config.instagram.enabled() {
        warn!("instagram_scraper: RAPIDAPI_KEY/RAPIDAPI_HOST not set, nothing to do");
        return Ok(());
    }

    let db = Database::new(&config.database.url).await?;
    let pool = db.pool();

    let control = Arc::new(ControlPlane::new(pool.clone(), "instagram_scraper", Duration::from_secs(30)));
    control.mark_starting().await?;

    let config_store = Arc::new(ConfigStore::new(pool.clone(), "instagram_scraper", "INSTAGRAM_SCRAPER"));
    let logger = Arc::new(StructuredLogger::new(pool.clone(), "instagram_scraper", "instagram_scraper.rs"));
    logger.clone().spawn_timer_flush();

    let metrics = Arc::new(MetricsCollector::new().map_err(|e| anyhow::anyhow!(e.to_string()))?);

    let scraper = match InstagramScraper::new(
        pool.clone(),
        config.instagram.rapidapi_key.clone().unwrap_or_default(),
        config.instagram.rapidapi_host.clone().unwrap_or_default(),
        config.instagram.requests_per_second as f64,
        config.instagram.retry_empty_response,
        logger.clone(),
        control.clone(),
        metrics,
        config.instagram.cost_per_request,
    ) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            control.fail_startup(&e.to_string()).await?;
            return Err(e.into());
        }
    };

    control.mark_running().await?;
    info!("instagram_scraper: started");

    let running = control.running_flag();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        running.store(false, Ordering::SeqCst);
    });

    let mut heartbeat = tokio::time::interval(control.heartbeat_interval());
    'supervisor: loop {
        heartbeat.tick().await;

        match control.heartbeat().await {
            Ok(true) => {}
            Ok(false) => break 'supervisor,
            Err(e) => {
                warn!(error = %e, "instagram_scraper: heartbeat write failed, retrying next tick");
                continue 'supervisor;
            }
        }
        if !control.should_continue() {
            break 'supervisor;
        }

        let options = config_store.get().await;
        let concurrent_creators = options.max_threads.unwrap_or(config.instagram.concurrent_creators as u32);

        match select_creators(&pool, options.batch_size).await {
            Ok(creators) if !creators.is_empty() => {
                if let Err(e) = scraper.run_cycle(creators, concurrent_creators).await {
                    error!(error = %e, "instagram_scraper: cycle failed");
                }
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "instagram_scraper: failed to select creator working set"),
        }
    }

    info!("instagram_scraper: stopping");
    control.mark_stopping().await?;
    logger.flush().await;
    control.mark_stopped().await?;
    Ok(())
}

/// `bool` is `first_time` (never scraped before), which `process_creator` uses
/// to size the initial reel/post backfill (§4.8).
async fn select_creators(pool: &PgPool, batch_size: u32) -> Result<Vec<(String, String, bool)>, CoreError> {
    let rows: Vec<(String, String, Option<DateTime<Utc>>)> = sqlx::query_as(
        "SELECT ig_user_id, username, last_scraped_at FROM instagram_creators \
         WHERE enabled = true ORDER BY last_scraped_at ASC NULLS FIRST LIMIT $1",
    )
    .bind(batch_size as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(ig_user_id, username, last)| (ig_user_id, username, last.is_none())).collect())
}
