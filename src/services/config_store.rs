//! Config Store (C1, §4.1): code defaults overlaid with the scraper's control
//! row `config` map, refreshed lazily every 5 minutes or on demand, with
//! `{SCRAPER}_SCRAPER_*` environment overrides (§6) applied last.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::warn;

const REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Recognized options (§4.1), each with its own default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScraperOptions {
    pub batch_size: u32,
    pub user_batch_size: u32,
    pub posts_per_subreddit: u32,
    pub user_submissions_limit: u32,
    pub rate_limit_delay_secs: f64,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub cache_batch_size: u32,
    pub heartbeat_interval_secs: u64,
    /// `None` until a proxy pool reports a working count; derived as one
    /// worker per working proxy, clamped and falling back to 5 (§4.1, §4.6 step 2).
    pub max_threads: Option<u32>,
}

impl Default for ScraperOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            user_batch_size: 30,
            posts_per_subreddit: 30,
            user_submissions_limit: 30,
            rate_limit_delay_secs: 1.0,
            max_retries: 3,
            timeout_secs: 300,
            cache_batch_size: 1000,
            heartbeat_interval_secs: 30,
            max_threads: None,
        }
    }
}

impl ScraperOptions {
    /// §4.6 step 2: worker count = working proxy count, clamped to [1,9],
    /// falling back to 5 when no proxy count is known yet.
    pub fn worker_count(&self, working_proxies: usize) -> u32 {
        if working_proxies == 0 {
            self.max_threads.unwrap_or(5)
        } else {
            (working_proxies as u32).clamp(1, 9)
        }
    }

    /// Applies `{env_prefix}_*` overrides on top of the DB-overlaid defaults.
    fn with_env_overrides(mut self, env_prefix: &str) -> Self {
        macro_rules! override_from_env {
            ($field:ident, $suffix:literal) => {
                if let Ok(v) = std::env::var(format!("{}_{}", env_prefix, $suffix)) {
                    if let Ok(parsed) = v.parse() {
                        self.$field = parsed;
                    }
                }
            };
        }
        override_from_env!(batch_size, "BATCH_SIZE");
        override_from_env!(user_batch_size, "USER_BATCH_SIZE");
        override_from_env!(posts_per_subreddit, "POSTS_PER_SUBREDDIT");
        override_from_env!(user_submissions_limit, "USER_SUBMISSIONS_LIMIT");
        override_from_env!(rate_limit_delay_secs, "RATE_LIMIT_DELAY");
        override_from_env!(max_retries, "MAX_RETRIES");
        override_from_env!(timeout_secs, "TIMEOUT");
        override_from_env!(cache_batch_size, "CACHE_BATCH_SIZE");
        override_from_env!(heartbeat_interval_secs, "HEARTBEAT_INTERVAL");
        if let Ok(v) = std::env::var(format!("{}_MAX_THREADS", env_prefix)) {
            if let Ok(parsed) = v.parse() {
                self.max_threads = Some(parsed);
            }
        }
        self
    }
}

struct CacheState {
    loaded_at: Instant,
    options: ScraperOptions,
}

/// Per-scraper config overlay. One instance per process (`reddit_scraper`,
/// `instagram_scraper`).
pub struct ConfigStore {
    pool: PgPool,
    scraper_name: String,
    env_prefix: String,
    cache: Arc<RwLock<CacheState>>,
}

impl ConfigStore {
    pub fn new(pool: PgPool, scraper_name: impl Into<String>, env_prefix: impl Into<String>) -> Self {
        let defaults = ScraperOptions::default();
        Self {
            pool,
            scraper_name: scraper_name.into(),
            env_prefix: env_prefix.into(),
            cache: Arc::new(RwLock::new(CacheState {
                loaded_at: Instant::now() - REFRESH_INTERVAL - Duration::from_secs(1),
                options: defaults,
            })),
        }
    }

    /// Returns the last observed value, refreshing from the DB if the cache
    /// is older than 5 minutes.
    pub async fn get(&self) -> ScraperOptions {
        if self.cache.read().await.loaded_at.elapsed() >= REFRESH_INTERVAL {
            self.reload().await;
        }
        self.cache.read().await.options.clone()
    }

    /// Forces a refresh from the DB, invalidating the cache regardless of age.
    pub async fn reload(&self) {
        let fetched = self.fetch_from_db().await;
        let merged = match fetched {
            Ok(overlay) => merge_overlay(ScraperOptions::default(), overlay),
            Err(e) => {
                warn!(scraper = %self.scraper_name, error = %e, "config store: DB read failed, falling back to defaults");
                ScraperOptions::default()
            }
        };
        let merged = merged.with_env_overrides(&self.env_prefix);

        let mut guard = self.cache.write().await;
        guard.options = merged;
        guard.loaded_at = Instant::now();
    }

    async fn fetch_from_db(&self) -> Result<serde_json::Value, sqlx::Error> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT config FROM system_control WHERE scraper_name = $1")
                .bind(&self.scraper_name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(config,)| config).unwrap_or(serde_json::Value::Null))
    }
}

fn merge_overlay(defaults: ScraperOptions, overlay: serde_json::Value) -> ScraperOptions {
    let Some(obj) = overlay.as_object() else {
        return defaults;
    };
    let mut value = serde_json::to_value(defaults.clone()).unwrap_or(serde_json::Value::Null);
    if let Some(base) = value.as_object_mut() {
        for (k, v) in obj {
            base.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(value).unwrap_or(defaults)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_clamps_to_1_9() {
        let opts = ScraperOptions::default();
        assert_eq!(opts.worker_count(0), 5);
        assert_eq!(opts.worker_count(3), 3);
        assert_eq!(opts.worker_count(20), 9);
    }

    #[test]
    fn merge_overlay_keeps_defaults_for_missing_keys() {
        let overlay = serde_json::json!({ "batch_size": 75 });
        let merged = merge_overlay(ScraperOptions::default(), overlay);
        assert_eq!(merged.batch_size, 75);
        assert_eq!(merged.user_batch_size, 30);
    }

    #[test]
    fn merge_overlay_ignores_non_object_overlay() {
        let merged = merge_overlay(ScraperOptions::default(), serde_json::Value::Null);
        assert_eq!(merged, ScraperOptions::default());
    }
}
