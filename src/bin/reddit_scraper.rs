//! Long-running supervisor for C6 (Subreddit Scraper) + C7 (User Scraper),
//! polling `system_control` at `heartbeat_interval` (§4.5, §5).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use b9_ingestion_core::config::AppConfig;
use b9_ingestion_core::database::Database;
use b9_ingestion_core::services::{ConfigStore, ControlPlane, HttpFetcher, ProxyPool, StructuredLogger, SubredditCache, SubredditScraper, UserScraper};
use tracing::{error, info, warn};

const MAX_RETRIES: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = AppConfig::from_env()?;
    let db = Database::new(&config.database.url).await?;
    let pool = db.pool();

    let control = Arc::new(ControlPlane::new(pool.clone(), "reddit_scraper", Duration::from_secs(30)));
    control.mark_starting().await?;

    let config_store = Arc::new(ConfigStore::new(pool.clone(), "reddit_scraper", "REDDIT_SCRAPER"));
    let proxy_pool = Arc::new(ProxyPool::new(pool.clone()));
    if let Err(e) = proxy_pool.load().await {
        control.fail_startup(&e.to_string()).await?;
        return Err(e.into());
    }

    let fetcher = Arc::new(HttpFetcher::new(proxy_pool.clone(), MAX_RETRIES));
    let logger = Arc::new(StructuredLogger::new(pool.clone(), "reddit_scraper", "reddit_scraper.rs"));
    logger.clone().spawn_timer_flush();

    let cache = Arc::new(SubredditCache::new(pool.clone()));
    if let Err(e) = cache.refresh().await {
        control.fail_startup(&e.to_string()).await?;
        return Err(e.into());
    }

    let initial_options = config_store.get().await;
    let subreddit_scraper = Arc::new(SubredditScraper::new(
        pool.clone(),
        fetcher.clone(),
        cache.clone(),
        logger.clone(),
        control.clone(),
        initial_options.posts_per_subreddit,
    ));
    let user_scraper = Arc::new(UserScraper::new(
        pool.clone(),
        fetcher.clone(),
        logger.clone(),
        control.clone(),
        initial_options.user_submissions_limit,
    ));

    control.mark_running().await?;
    info!("reddit_scraper: started");

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
                warn!(error = %e, "reddit_scraper: heartbeat write failed, retrying next tick");
                continue 'supervisor;
            }
        }
        if !control.should_continue() {
            break 'supervisor;
        }

        let options = config_store.get().await;

        if !cache.is_complete().await {
            if let Err(e) = cache.refresh().await {
                error!(error = %e, "reddit_scraper: subreddit cache refresh failed");
            }
        }

        let worker_count = options.worker_count(proxy_pool.working_count().await);

        match subreddit_scraper.select_working_set(options.batch_size).await {
            Ok(names) if !names.is_empty() => {
                if let Err(e) = subreddit_scraper.run_cycle(names, worker_count).await {
                    error!(error = %e, "reddit_scraper: subreddit cycle failed");
                }
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "reddit_scraper: failed to select subreddit working set"),
        }

        if !control.should_continue() {
            break 'supervisor;
        }

        match user_scraper.select_working_set(options.user_batch_size).await {
            Ok(usernames) if !usernames.is_empty() => {
                if let Err(e) = user_scraper.run_batch(usernames).await {
                    error!(error = %e, "reddit_scraper: user batch failed");
                }
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "reddit_scraper: failed to select user working set"),
        }
    }

    info!("reddit_scraper: stopping");
    control.mark_stopping().await?;
    logger.flush().await;
    control.mark_stopped().await?;
    Ok(())
}
