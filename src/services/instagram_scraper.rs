//! Instagram Scraper (C8, §4.8): per-creator profile/reel/post ingestion
//! behind a global RapidAPI token bucket, with growth tracking and viral
//! flagging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::metrics::MetricsCollector;
use crate::models::instagram::{growth_rate, is_viral, InstagramAnalytics, MediaKind};
use crate::services::control_plane::ControlPlane;
use crate::services::logger::StructuredLogger;

const DEFAULT_REQUESTS_PER_SECOND: f64 = 55.0;
const MAX_REQUESTS_PER_SECOND: f64 = 60.0;
const MAX_TRANSPORT_FAILURES: u32 = 5;
const FIRST_TIME_REELS: u32 = 90;
const EXISTING_REELS: u32 = 30;
const FIRST_TIME_POSTS: u32 = 30;
const EXISTING_POSTS: u32 = 10;

/// §4.8 concurrency: a single shared bucket serializes every RapidAPI call
/// regardless of which creator-worker issues it, keeping the aggregate rate
/// under the ceiling (60 rps) irrespective of worker count.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let clamped = requests_per_second.min(MAX_REQUESTS_PER_SECOND).max(1.0);
        Self {
            min_interval: Duration::from_secs_f64(1.0 / clamped),
            last_request: Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(*last);
        if elapsed < self.min_interval {
            tokio::time::sleep(self.min_interval - elapsed).await;
        }
        *last = Instant::now();
    }
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    follower_count: Option<i64>,
    following_count: Option<i64>,
    media_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MediaListResponse {
    #[serde(default)]
    items: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    pk: String,
    #[serde(default)]
    taken_at: i64,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    comment_count: i64,
    view_count: Option<i64>,
}

pub struct InstagramScraper {
    pool: PgPool,
    client: reqwest::Client,
    api_host: String,
    rate_limiter: Arc<RateLimiter>,
    logger: Arc<StructuredLogger>,
    control: Arc<ControlPlane>,
    metrics: Arc<MetricsCollector>,
    cost_per_request: f64,
    retry_empty_response: u32,
}

impl InstagramScraper {
    pub fn new(
        pool: PgPool,
        api_key: impl Into<String>,
        api_host: impl Into<String>,
        requests_per_second: f64,
        retry_empty_response: u32,
        logger: Arc<StructuredLogger>,
        control: Arc<ControlPlane>,
        metrics: Arc<MetricsCollector>,
        cost_per_request: f64,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let api_host = api_host.into();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-rapidapi-key", reqwest::header::HeaderValue::from_str(&api_key).map_err(|e| CoreError::Config(e.to_string()))?);
        headers.insert("x-rapidapi-host", reqwest::header::HeaderValue::from_str(&api_host).map_err(|e| CoreError::Config(e.to_string()))?);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(CoreError::from)?;

        Ok(Self {
            pool,
            client,
            api_host,
            rate_limiter: Arc::new(RateLimiter::new(requests_per_second)),
            logger,
            control,
            metrics,
            cost_per_request,
            retry_empty_response,
        })
    }

    /// §4.8 worker pool: fixed-size concurrency, each worker serializing
    /// through the shared rate limiter. Partial creator failures never block
    /// the rest of the batch.
    pub async fn run_cycle(&self, creators: Vec<(String, String, bool)>, concurrent_creators: u32) -> Result<()> {
        let worker_count = concurrent_creators.max(1) as usize;
        let shards: Vec<Vec<(String, String, bool)>> = {
            let mut shards: Vec<Vec<(String, String, bool)>> = (0..worker_count).map(|_| Vec::new()).collect();
            for (i, item) in creators.into_iter().enumerate() {
                shards[i % worker_count].push(item);
            }
            shards
        };

        let mut handles = Vec::new();
        for shard in shards {
            let pool = self.pool.clone();
            let client = self.client.clone();
            let api_host = self.api_host.clone();
            let rate_limiter = self.rate_limiter.clone();
            let logger = self.logger.clone();
            let control = self.control.clone();
            let metrics = self.metrics.clone();
            let cost_per_request = self.cost_per_request;
            let retry_empty_response = self.retry_empty_response;

            handles.push(tokio::spawn(async move {
                let worker = InstagramScraper {
                    pool,
                    client,
                    api_host,
                    rate_limiter,
                    logger,
                    control,
                    metrics,
                    cost_per_request,
                    retry_empty_response,
                };
                for (ig_user_id, username, first_time) in shard {
                    if !worker.control.should_continue() {
                        break;
                    }
                    if let Err(e) = worker.process_creator(&ig_user_id, &username, first_time).await {
                        warn!(creator = %username, error = %e, "instagram scraper: item failed");
                    }
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn call(&self, path: &str, query: &[(&str, &str)]) -> std::result::Result<Value, String> {
        self.rate_limiter.acquire().await;
        let url = format!("https://{}{}", self.api_host, path);
        let response = self.client.get(&url).query(query).send().await.map_err(|e| e.to_string())?;
        self.metrics.record_instagram_request(self.cost_per_request);
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        response.json::<Value>().await.map_err(|e| e.to_string())
    }

    async fn call_with_failure_budget(&self, path: &str, query: &[(&str, &str)]) -> Option<Value> {
        let mut failures = 0u32;
        loop {
            match self.call(path, query).await {
                Ok(value) => return Some(value),
                Err(msg) => {
                    failures += 1;
                    warn!(path, failures, error = msg, "instagram scraper: rapidapi call failed");
                    if failures >= MAX_TRANSPORT_FAILURES {
                        return None;
                    }
                }
            }
        }
    }

    async fn process_creator(&self, ig_user_id: &str, username: &str, first_time: bool) -> Result<()> {
        let Some(profile) = self.call_with_failure_budget("/profile", &[("username", username)]).await else {
            return Ok(());
        };
        let profile: ProfileResponse = serde_json::from_value(profile).unwrap_or(ProfileResponse {
            follower_count: None,
            following_count: None,
            media_count: None,
        });
        let followers_count = profile.follower_count.unwrap_or(0);

        self.record_follower_snapshot(ig_user_id, followers_count).await?;

        let reels_limit = if first_time { FIRST_TIME_REELS } else { EXISTING_REELS };
        let posts_limit = if first_time { FIRST_TIME_POSTS } else { EXISTING_POSTS };

        let reels = self.fetch_media_with_retry("/reels", ig_user_id, reels_limit, MediaKind::Reel).await;
        if !self.control.should_continue() {
            return Ok(());
        }
        let posts = self.fetch_media_with_retry("/user-feeds", ig_user_id, posts_limit, MediaKind::Post).await;

        let avg_views_per_reel = mean(reels.iter().filter_map(|m| m.view_count).map(|v| v as f64));
        for reel in &reels {
            let viral = reel.view_count.map(|v| is_viral(v, avg_views_per_reel)).unwrap_or(false);
            self.upsert_media(ig_user_id, reel, viral).await?;
        }
        for post in &posts {
            self.upsert_media(ig_user_id, post, false).await?;
        }

        let analytics = compute_analytics(&reels, &posts, followers_count, avg_views_per_reel);

        sqlx::query(
            "UPDATE instagram_creators SET followers_count = $2, following_count = $3, media_count = $4, \
             avg_views_per_reel = $5, avg_engagement_per_post = $6, engagement_rate = $7, last_scraped_at = now() \
             WHERE ig_user_id = $1",
        )
        .bind(ig_user_id)
        .bind(followers_count)
        .bind(profile.following_count.unwrap_or(0))
        .bind(profile.media_count.unwrap_or(0))
        .bind(analytics.avg_views_per_reel)
        .bind(analytics.avg_engagement_per_post)
        .bind(analytics.engagement_rate)
        .execute(&self.pool)
        .await?;

        self.logger
            .log(
                crate::models::log_entry::LogLevel::Success,
                format!("✅ Completed @{} | Engagement: {:.4}", username, analytics.engagement_rate),
            )
            .await;
        Ok(())
    }

    /// Retries an empty-content response up to `retry_empty_response` times
    /// (§4.8), separate from the transport-failure budget.
    async fn fetch_media_with_retry(&self, path: &str, ig_user_id: &str, limit: u32, kind: MediaKind) -> Vec<MediaEntry> {
        let limit_str = limit.to_string();
        for attempt in 0..=self.retry_empty_response {
            let Some(body) = self.call_with_failure_budget(path, &[("user_id", ig_user_id), ("count", &limit_str)]).await else {
                return Vec::new();
            };
            let parsed: MediaListResponse = serde_json::from_value(body).unwrap_or(MediaListResponse { items: vec![] });
            if !parsed.items.is_empty() {
                return parsed.items.into_iter().map(|item| MediaEntry::from_item(item, kind)).collect();
            }
            if attempt < self.retry_empty_response {
                warn!(path, ig_user_id, attempt, "instagram scraper: empty content response, retrying");
            }
        }
        Vec::new()
    }

    async fn upsert_media(&self, creator_id: &str, media: &MediaEntry, is_viral: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO instagram_media (media_pk, creator_id, kind, taken_at, like_count, comment_count, view_count, is_viral) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8) \
             ON CONFLICT (media_pk) DO UPDATE SET like_count = EXCLUDED.like_count, \
             comment_count = EXCLUDED.comment_count, view_count = EXCLUDED.view_count, is_viral = EXCLUDED.is_viral",
        )
        .bind(&media.media_pk)
        .bind(creator_id)
        .bind(media.kind)
        .bind(media.taken_at)
        .bind(media.like_count)
        .bind(media.comment_count)
        .bind(media.view_count)
        .bind(is_viral)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_follower_snapshot(&self, creator_id: &str, followers_count: i64) -> Result<()> {
        let today = Utc::now().date_naive();
        let yesterday: Option<(i64,)> = sqlx::query_as(
            "SELECT followers_count FROM instagram_follower_snapshots WHERE creator_id = $1 AND snapshot_date = $2",
        )
        .bind(creator_id)
        .bind(today - chrono::Duration::days(1))
        .fetch_optional(&self.pool)
        .await?;
        let week_ago: Option<(i64,)> = sqlx::query_as(
            "SELECT followers_count FROM instagram_follower_snapshots WHERE creator_id = $1 AND snapshot_date = $2",
        )
        .bind(creator_id)
        .bind(today - chrono::Duration::days(7))
        .fetch_optional(&self.pool)
        .await?;

        let daily_growth_rate = yesterday.and_then(|(prev,)| growth_rate(prev, followers_count));
        let weekly_growth_rate = week_ago.and_then(|(prev,)| growth_rate(prev, followers_count));

        sqlx::query(
            "INSERT INTO instagram_follower_snapshots (creator_id, snapshot_date, followers_count, daily_growth_rate, weekly_growth_rate) \
             VALUES ($1,$2,$3,$4,$5) ON CONFLICT (creator_id, snapshot_date) DO UPDATE SET \
             followers_count = EXCLUDED.followers_count, daily_growth_rate = EXCLUDED.daily_growth_rate, \
             weekly_growth_rate = EXCLUDED.weekly_growth_rate",
        )
        .bind(creator_id)
        .bind(today)
        .bind(followers_count)
        .bind(daily_growth_rate)
        .bind(weekly_growth_rate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

struct MediaEntry {
    media_pk: String,
    kind: MediaKind,
    taken_at: chrono::DateTime<Utc>,
    like_count: i64,
    comment_count: i64,
    view_count: Option<i64>,
}

impl MediaEntry {
    fn from_item(item: MediaItem, kind: MediaKind) -> Self {
        Self {
            media_pk: item.pk,
            kind,
            taken_at: chrono::DateTime::from_timestamp(item.taken_at, 0).unwrap_or_else(Utc::now),
            like_count: item.like_count,
            comment_count: item.comment_count,
            view_count: item.view_count,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// §4.8 step 5: engagement_rate is the mean of `(likes+comments)/followers`
/// over recent content (reels + posts combined).
fn compute_analytics(reels: &[MediaEntry], posts: &[MediaEntry], followers_count: i64, avg_views_per_reel: f64) -> InstagramAnalytics {
    let all: Vec<&MediaEntry> = reels.iter().chain(posts.iter()).collect();
    let engagement_rate = if followers_count > 0 {
        mean(all.iter().map(|m| (m.like_count + m.comment_count) as f64 / followers_count as f64))
    } else {
        0.0
    };
    let avg_engagement_per_post = mean(posts.iter().map(|m| (m.like_count + m.comment_count) as f64));

    InstagramAnalytics {
        engagement_rate,
        avg_views_per_reel,
        avg_engagement_per_post,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(likes: i64, comments: i64, views: Option<i64>) -> MediaEntry {
        MediaEntry {
            media_pk: "1".to_string(),
            kind: MediaKind::Reel,
            taken_at: Utc::now(),
            like_count: likes,
            comment_count: comments,
            view_count: views,
        }
    }

    #[test]
    fn engagement_rate_is_mean_across_reels_and_posts() {
        let reels = vec![entry(100, 10, Some(1000))];
        let posts = vec![entry(50, 5, None)];
        let analytics = compute_analytics(&reels, &posts, 1000, 1000.0);
        assert_eq!(analytics.engagement_rate, (0.11 + 0.055) / 2.0);
    }

    #[test]
    fn engagement_rate_zero_followers_is_zero_not_nan() {
        let reels = vec![entry(100, 10, Some(1000))];
        let analytics = compute_analytics(&reels, &[], 0, 1000.0);
        assert_eq!(analytics.engagement_rate, 0.0);
    }

    #[tokio::test]
    async fn rate_limiter_spaces_out_acquisitions() {
        let limiter = RateLimiter::new(1000.0);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(1));
    }
}
