//! Subreddit Scraper (C6, §4.6): fetch → compute metrics → protected upsert
//! → discover users, the largest single pipeline in the core.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, QueryBuilder};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{CoreError, Result};
use crate::models::post::{truncate_selftext, Post};
use crate::models::subreddit::{ReviewState, SubredditMetrics};
use crate::services::calculator::{compute_subreddit_metrics, PostSample};
use crate::services::control_plane::ControlPlane;
use crate::services::http_fetcher::{FetchOutcome, HttpFetcher};
use crate::services::logger::StructuredLogger;
use crate::services::protected_upsert::{
    protected_merge, terminal_review_for, ComputedSubredditFields, ExistingSubredditFields, TerminalOutcome,
};

const STALENESS_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Child<T>>,
}

#[derive(Debug, Deserialize)]
struct Child<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct AboutData {
    display_name: Option<String>,
    url: Option<String>,
    subscribers: Option<i64>,
    accounts_active: Option<i64>,
    over18: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    title: String,
    author: String,
    created_utc: f64,
    score: i64,
    upvote_ratio: Option<f64>,
    num_comments: i64,
    over_18: bool,
    #[serde(default)]
    spoiler: bool,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    locked: bool,
    is_self: bool,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    is_gallery: bool,
    permalink: String,
    url: String,
    domain: String,
    #[serde(default)]
    selftext: String,
}

/// §4.6 cache: `name → {review, primary_category, tags, over18}`, loaded with
/// strict pagination and a head-count cross-check. Incomplete caches MUST NOT
/// be used for protected-field decisions (fall back to a per-row lookup).
pub struct SubredditCache {
    pool: PgPool,
    entries: RwLock<HashMap<String, ExistingSubredditFields>>,
    complete: RwLock<bool>,
}

impl SubredditCache {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            entries: RwLock::new(HashMap::new()),
            complete: RwLock::new(false),
        }
    }

    pub async fn refresh(&self) -> Result<()> {
        let head_count: i64 = sqlx::query_scalar("SELECT count(*) FROM reddit_subreddits")
            .fetch_one(&self.pool)
            .await?;

        let mut loaded = HashMap::new();
        let page_size: i64 = 5000;
        let mut offset: i64 = 0;
        loop {
            let rows: Vec<(String, ReviewState, Option<String>, Vec<String>, Option<bool>, i64, i64)> = sqlx::query_as(
                "SELECT name, review, primary_category, tags, over18, subscribers, accounts_active FROM reddit_subreddits ORDER BY name LIMIT $1 OFFSET $2",
            )
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

            let returned = rows.len() as i64;
            for (name, review, primary_category, tags, over18, subscribers, accounts_active) in rows {
                loaded.insert(
                    name,
                    ExistingSubredditFields {
                        review,
                        primary_category,
                        tags,
                        over18,
                        subscribers,
                        accounts_active,
                    },
                );
            }

            offset += page_size;
            if returned < page_size {
                break;
            }
        }

        let is_complete = loaded.len() as i64 >= head_count;
        if !is_complete {
            error!(loaded = loaded.len(), head_count, "subreddit cache: incomplete load, pagination invariant violated");
        }

        *self.entries.write().await = loaded;
        *self.complete.write().await = is_complete;
        Ok(())
    }

    pub async fn is_complete(&self) -> bool {
        *self.complete.read().await
    }

    /// Falls back to a per-row lookup when the cache is incomplete, per §4.6.
    pub async fn get(&self, name: &str) -> Result<Option<ExistingSubredditFields>> {
        if *self.complete.read().await {
            return Ok(self.entries.read().await.get(name).cloned());
        }
        let row: Option<(ReviewState, Option<String>, Vec<String>, Option<bool>, i64, i64)> = sqlx::query_as(
            "SELECT review, primary_category, tags, over18, subscribers, accounts_active FROM reddit_subreddits WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(review, primary_category, tags, over18, subscribers, accounts_active)| ExistingSubredditFields {
            review,
            primary_category,
            tags,
            over18,
            subscribers,
            accounts_active,
        }))
    }
}

pub struct SubredditScraper {
    pool: PgPool,
    fetcher: Arc<HttpFetcher>,
    cache: Arc<SubredditCache>,
    logger: Arc<StructuredLogger>,
    control: Arc<ControlPlane>,
    posts_per_subreddit: u32,
}

impl SubredditScraper {
    pub fn new(
        pool: PgPool,
        fetcher: Arc<HttpFetcher>,
        cache: Arc<SubredditCache>,
        logger: Arc<StructuredLogger>,
        control: Arc<ControlPlane>,
        posts_per_subreddit: u32,
    ) -> Self {
        Self { pool, fetcher, cache, logger, control, posts_per_subreddit }
    }

    /// §4.6 step 1: working set selection.
    pub async fn select_working_set(&self, batch_size: u32) -> Result<Vec<String>> {
        let cutoff = Utc::now() - chrono::Duration::hours(STALENESS_HOURS);
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM reddit_subreddits WHERE review IN ('Ok', 'No Seller') \
             AND (last_scraped_at IS NULL OR last_scraped_at < $1) \
             ORDER BY last_scraped_at ASC NULLS FIRST LIMIT $2",
        )
        .bind(cutoff)
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    /// §4.6 step 2/3: shards the working set across `worker_count` workers and
    /// processes each subreddit, stopping early if the control plane asks to.
    pub async fn run_cycle(&self, working_set: Vec<String>, worker_count: u32) -> Result<()> {
        let worker_count = worker_count.max(1) as usize;
        let shards: Vec<Vec<String>> = shard(working_set, worker_count);

        let mut handles = Vec::new();
        for shard in shards {
            let this_pool = self.pool.clone();
            let fetcher = self.fetcher.clone();
            let cache = self.cache.clone();
            let logger = self.logger.clone();
            let control = self.control.clone();
            let posts_per_subreddit = self.posts_per_subreddit;

            handles.push(tokio::spawn(async move {
                let worker = SubredditScraper {
                    pool: this_pool,
                    fetcher,
                    cache,
                    logger,
                    control,
                    posts_per_subreddit,
                };
                for name in shard {
                    if !worker.control.should_continue() {
                        break;
                    }
                    if let Err(e) = worker.process_one(&name).await {
                        warn!(subreddit = %name, error = %e, "subreddit scraper: item failed");
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Thin entry point for the `/api/subreddits/fetch-single` handler (C11):
    /// runs the same fetch→compute→upsert→discover pipeline as a cycle item,
    /// then hands back the resulting cache row.
    pub async fn fetch_single(&self, name: &str) -> Result<ExistingSubredditFields> {
        self.process_one(name).await?;
        self.cache
            .get(name)
            .await?
            .ok_or_else(|| CoreError::NotFound { resource: format!("subreddit {}", name) })
    }

    async fn process_one(&self, name: &str) -> Result<()> {
        let about = match self.fetcher.fetch_with_retry(&about_url(name)).await {
            FetchOutcome::Success(body) => body,
            other => return self.handle_terminal_outcome(name, other).await,
        };
        let about: AboutData = serde_json::from_value(about["data"].clone()).unwrap_or(AboutData {
            display_name: None,
            url: None,
            subscribers: None,
            accounts_active: None,
            over18: None,
        });

        let hot_posts = match self.fetcher.fetch_with_retry(&hot_url(name, self.posts_per_subreddit)).await {
            FetchOutcome::Success(body) => parse_listing(body),
            other => return self.handle_terminal_outcome(name, other).await,
        };

        let top_posts = match self.fetcher.fetch_with_retry(&top_url(name)).await {
            FetchOutcome::Success(body) => parse_listing(body),
            FetchOutcome::Transient(_) | FetchOutcome::Timeout(_) => Vec::new(),
            other => return self.handle_terminal_outcome(name, other).await,
        };

        let subscribers = about.subscribers.unwrap_or(0);
        let post_frequency = estimate_post_frequency(&top_posts);

        let hot_samples: Vec<PostSample> = hot_posts.iter().map(to_post_sample).collect();
        let top_samples: Vec<PostSample> = top_posts.iter().map(to_post_sample).collect();
        let metrics = compute_subreddit_metrics(&hot_samples, &top_samples, subscribers, post_frequency);

        let existing = self
            .cache
            .get(name)
            .await?
            .ok_or_else(|| CoreError::NotFound { resource: format!("subreddit cache entry for {}", name) })?;

        let computed = ComputedSubredditFields {
            primary_category: None,
            tags: vec![],
            over18: about.over18,
            subscribers,
            accounts_active: about.accounts_active.unwrap_or(0),
            metrics: metrics.clone(),
        };

        let payload = protected_merge(&existing, &computed);
        self.apply_upsert(name, &payload).await?;

        for post in &hot_posts {
            if let Err(e) = self.insert_post(name, post, &existing).await {
                warn!(subreddit = %name, post_id = %post.id, error = %e, "subreddit scraper: failed to store post");
            }
        }

        if existing.review == ReviewState::Ok {
            self.discover_users(&hot_posts).await?;
        }

        self.log_completed(name, &existing.review, &metrics).await;
        Ok(())
    }

    async fn handle_terminal_outcome(&self, name: &str, outcome: FetchOutcome) -> Result<()> {
        match outcome {
            FetchOutcome::Banned => {
                self.set_review(name, terminal_review_for(TerminalOutcome::Banned)).await
            }
            FetchOutcome::Forbidden => {
                self.set_review(name, terminal_review_for(TerminalOutcome::Forbidden)).await
            }
            FetchOutcome::NotFound => {
                self.set_review(name, terminal_review_for(TerminalOutcome::NotFound)).await
            }
            FetchOutcome::RateLimited => {
                info!(subreddit = %name, "subreddit scraper: rate limited, re-queued for next cycle");
                Ok(())
            }
            FetchOutcome::Transient(msg) | FetchOutcome::Timeout(msg) => {
                warn!(subreddit = %name, error = msg, "subreddit scraper: transport error, item skipped");
                Ok(())
            }
            FetchOutcome::Success(_) => unreachable!("handle_terminal_outcome called with a success outcome"),
        }
    }

    async fn set_review(&self, name: &str, review: crate::models::subreddit::ReviewState) -> Result<()> {
        sqlx::query("UPDATE reddit_subreddits SET review = $2 WHERE name = $1")
            .bind(name)
            .bind(review)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_upsert(&self, name: &str, payload: &crate::services::protected_upsert::UpsertPayload) -> Result<()> {
        let mut builder = QueryBuilder::new("UPDATE reddit_subreddits SET ");
        let mut separated = builder.separated(", ");
        separated.push("avg_upvotes_per_post = ").push_bind_unseparated(payload.avg_upvotes_per_post);
        separated.push("avg_comments_per_post = ").push_bind_unseparated(payload.avg_comments_per_post);
        separated.push("engagement = ").push_bind_unseparated(payload.engagement);
        separated.push("subreddit_score = ").push_bind_unseparated(payload.subreddit_score);
        separated.push("best_posting_day = ").push_bind_unseparated(payload.best_posting_day.clone());
        separated.push("best_posting_hour = ").push_bind_unseparated(payload.best_posting_hour);
        separated.push("min_post_karma = ").push_bind_unseparated(payload.min_post_karma);
        separated.push("min_comment_karma = ").push_bind_unseparated(payload.min_comment_karma);
        separated.push("min_account_age_days = ").push_bind_unseparated(payload.min_account_age_days);
        separated.push("last_scraped_at = now()");

        if let Some(ref primary_category) = payload.primary_category {
            separated.push("primary_category = ").push_bind_unseparated(primary_category.clone());
        }
        if let Some(ref tags) = payload.tags {
            separated.push("tags = ").push_bind_unseparated(tags.clone());
        }
        if let Some(over18) = payload.over18 {
            separated.push("over18 = ").push_bind_unseparated(over18);
        }
        if let Some(subscribers) = payload.subscribers {
            separated.push("subscribers = ").push_bind_unseparated(subscribers);
        }
        if let Some(accounts_active) = payload.accounts_active {
            separated.push("accounts_active = ").push_bind_unseparated(accounts_active);
        }

        builder.push(" WHERE name = ");
        builder.push_bind(name);

        builder.build().execute(&self.pool).await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn insert_post(&self, subreddit_name: &str, post: &PostData, existing: &ExistingSubredditFields) -> Result<()> {
        let row = Post {
            reddit_id: post.id.clone(),
            title: post.title.clone(),
            author: post.author.clone(),
            subreddit_name: subreddit_name.to_string(),
            created_utc: DateTime::from_timestamp(post.created_utc as i64, 0).unwrap_or_else(Utc::now),
            score: post.score,
            upvote_ratio: post.upvote_ratio.unwrap_or(0.0),
            num_comments: post.num_comments,
            over_18: post.over_18,
            spoiler: post.spoiler,
            stickied: post.stickied,
            locked: post.locked,
            is_self: post.is_self,
            is_video: post.is_video,
            is_gallery: post.is_gallery,
            permalink: post.permalink.clone(),
            url: post.url.clone(),
            domain: post.domain.clone(),
            selftext: truncate_selftext(&post.selftext),
            post_type: classify_post_type(post).to_string(),
            sub_primary_category: existing.primary_category.clone(),
            sub_tags: existing.tags.clone(),
            sub_over18: existing.over18,
        };

        sqlx::query(
            "INSERT INTO reddit_posts (reddit_id, title, author, subreddit_name, created_utc, score, upvote_ratio, \
             num_comments, over_18, spoiler, stickied, locked, is_self, is_video, is_gallery, permalink, url, domain, \
             selftext, post_type, sub_primary_category, sub_tags, sub_over18) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23) \
             ON CONFLICT (reddit_id) DO UPDATE SET score = EXCLUDED.score, num_comments = EXCLUDED.num_comments, \
             upvote_ratio = EXCLUDED.upvote_ratio",
        )
        .bind(&row.reddit_id)
        .bind(&row.title)
        .bind(&row.author)
        .bind(&row.subreddit_name)
        .bind(row.created_utc)
        .bind(row.score)
        .bind(row.upvote_ratio)
        .bind(row.num_comments)
        .bind(row.over_18)
        .bind(row.spoiler)
        .bind(row.stickied)
        .bind(row.locked)
        .bind(row.is_self)
        .bind(row.is_video)
        .bind(row.is_gallery)
        .bind(&row.permalink)
        .bind(&row.url)
        .bind(&row.domain)
        .bind(&row.selftext)
        .bind(&row.post_type)
        .bind(&row.sub_primary_category)
        .bind(&row.sub_tags)
        .bind(row.sub_over18)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// §4.6 step f / §4.7 step 4 / S5: discover subreddits from unique authors.
    async fn discover_users(&self, posts: &[PostData]) -> Result<()> {
        let authors: HashSet<&str> = posts
            .iter()
            .map(|p| p.author.as_str())
            .filter(|a| !matches!(*a, "[deleted]" | "AutoModerator"))
            .collect();

        for author in authors {
            sqlx::query(
                "INSERT INTO reddit_users (username, account_age_days, post_karma, comment_karma, username_score, \
                 age_score, karma_score, overall_score, is_suspended) \
                 VALUES ($1, 0, 0, 0, 0, 0, 0, 0, false) ON CONFLICT (username) DO NOTHING",
            )
            .bind(author)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn log_completed(&self, name: &str, review: &ReviewState, metrics: &SubredditMetrics) {
        let best = match (&metrics.best_posting_day, metrics.best_posting_hour) {
            (Some(day), Some(hour)) => format!("{} {}h", day, hour),
            _ => "N/A N/A".to_string(),
        };
        let message = format!(
            "✅ Completed {} r/{} | Engagement: {:.4} | Upvotes: {:.0} | Score: {:.2} | Best: {}",
            review, name, metrics.engagement, metrics.avg_upvotes_per_post, metrics.subreddit_score, best
        );
        self.logger.log(crate::models::log_entry::LogLevel::Success, message).await;
    }
}

fn shard(items: Vec<String>, worker_count: usize) -> Vec<Vec<String>> {
    let mut shards: Vec<Vec<String>> = (0..worker_count).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        shards[i % worker_count].push(item);
    }
    shards
}

fn about_url(name: &str) -> String {
    format!("https://www.reddit.com/r/{}/about.json", name)
}

fn hot_url(name: &str, limit: u32) -> String {
    format!("https://www.reddit.com/r/{}/hot.json?limit={}", name, limit)
}

fn top_url(name: &str) -> String {
    format!("https://www.reddit.com/r/{}/top.json?t=year&limit=10", name)
}

fn parse_listing(body: serde_json::Value) -> Vec<PostData> {
    serde_json::from_value::<Listing<PostData>>(body)
        .map(|listing| listing.data.children.into_iter().map(|c| c.data).collect())
        .unwrap_or_default()
}

fn to_post_sample(post: &PostData) -> PostSample {
    PostSample {
        score: post.score,
        num_comments: post.num_comments,
        created_utc: DateTime::from_timestamp(post.created_utc as i64, 0).unwrap_or_else(Utc::now),
    }
}

fn estimate_post_frequency(top_posts: &[PostData]) -> f64 {
    if top_posts.len() < 2 {
        return 0.0;
    }
    let mut timestamps: Vec<f64> = top_posts.iter().map(|p| p.created_utc).collect();
    timestamps.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let span_days = (timestamps.last().unwrap() - timestamps.first().unwrap()) / 86_400.0;
    if span_days <= 0.0 {
        0.0
    } else {
        top_posts.len() as f64 / span_days
    }
}

fn classify_post_type(post: &PostData) -> &'static str {
    if post.is_gallery {
        "gallery"
    } else if post.is_video {
        "video"
    } else if post.is_self {
        "self"
    } else if is_image_domain(&post.domain) {
        "image"
    } else {
        "link"
    }
}

fn is_image_domain(domain: &str) -> bool {
    domain.ends_with("i.redd.it") || domain.ends_with("imgur.com")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S2 — zero-engagement "Completed" line renders `Best: N/A N/A`.
    #[test]
    fn completed_line_renders_na_for_zero_engagement() {
        let metrics = SubredditMetrics {
            avg_upvotes_per_post: 10.0,
            avg_comments_per_post: 1.0,
            engagement: 0.0,
            subreddit_score: 5.0,
            best_posting_day: None,
            best_posting_hour: None,
            min_post_karma: None,
            min_comment_karma: None,
            min_account_age_days: None,
        };
        let best = match (&metrics.best_posting_day, metrics.best_posting_hour) {
            (Some(day), Some(hour)) => format!("{} {}h", day, hour),
            _ => "N/A N/A".to_string(),
        };
        assert_eq!(best, "N/A N/A");
    }

    #[test]
    fn sharding_distributes_round_robin() {
        let items: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        let shards = shard(items, 2);
        assert_eq!(shards[0], vec!["0", "2", "4"]);
        assert_eq!(shards[1], vec!["1", "3"]);
    }

    #[test]
    fn classify_post_type_prefers_gallery_then_video_then_self() {
        let mut post = PostData {
            id: "1".into(),
            title: "t".into(),
            author: "a".into(),
            created_utc: 0.0,
            score: 0,
            upvote_ratio: None,
            num_comments: 0,
            over_18: false,
            spoiler: false,
            stickied: false,
            locked: false,
            is_self: true,
            is_video: true,
            is_gallery: true,
            permalink: "".into(),
            url: "".into(),
            domain: "self.test".into(),
            selftext: "".into(),
        };
        assert_eq!(classify_post_type(&post), "gallery");
        post.is_gallery = false;
        assert_eq!(classify_post_type(&post), "video");
        post.is_video = false;
        assert_eq!(classify_post_type(&post), "self");
    }
}
