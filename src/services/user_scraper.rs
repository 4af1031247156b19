//! User Scraper (C7, §4.7): per-username quality scoring plus subreddit
//! discovery from a user's submission history.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::warn;

use crate::error::Result;
use crate::services::calculator::compute_quality_scores;
use crate::services::control_plane::ControlPlane;
use crate::services::http_fetcher::{FetchOutcome, HttpFetcher};
use crate::services::logger::StructuredLogger;

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
    created_utc: f64,
    link_karma: Option<i64>,
    comment_karma: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SubmissionData {
    subreddit: String,
}

pub struct UserScraper {
    pool: PgPool,
    fetcher: Arc<HttpFetcher>,
    logger: Arc<StructuredLogger>,
    control: Arc<ControlPlane>,
    user_submissions_limit: u32,
}

impl UserScraper {
    pub fn new(
        pool: PgPool,
        fetcher: Arc<HttpFetcher>,
        logger: Arc<StructuredLogger>,
        control: Arc<ControlPlane>,
        user_submissions_limit: u32,
    ) -> Self {
        Self { pool, fetcher, logger, control, user_submissions_limit }
    }

    /// §4.7 working set: non-suspended users not processed within `staleness_hours`.
    pub async fn select_working_set(&self, batch_size: u32) -> Result<Vec<String>> {
        let cutoff = Utc::now() - chrono::Duration::hours(STALENESS_HOURS);
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT username FROM reddit_users WHERE is_suspended = false \
             AND (last_scraped_at IS NULL OR last_scraped_at < $1) \
             ORDER BY last_scraped_at ASC NULLS FIRST LIMIT $2",
        )
        .bind(cutoff)
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    pub async fn run_batch(&self, usernames: Vec<String>) -> Result<()> {
        for username in usernames {
            if !self.control.should_continue() {
                break;
            }
            if let Err(e) = self.process_one(&username).await {
                warn!(username = %username, error = %e, "user scraper: item failed");
            }
        }
        Ok(())
    }

    async fn process_one(&self, username: &str) -> Result<()> {
        let about = match self.fetcher.fetch_with_retry(&about_url(username)).await {
            FetchOutcome::Success(body) => body,
            FetchOutcome::Forbidden => {
                self.mark_suspended(username).await?;
                return Ok(());
            }
            FetchOutcome::Banned | FetchOutcome::NotFound => {
                self.mark_suspended(username).await?;
                return Ok(());
            }
            FetchOutcome::RateLimited => return Ok(()),
            FetchOutcome::Transient(msg) | FetchOutcome::Timeout(msg) => {
                warn!(username, error = msg, "user scraper: transport error, item skipped");
                return Ok(());
            }
        };
        let about: AboutData = serde_json::from_value(about["data"].clone()).map_err(crate::error::CoreError::from)?;

        let submissions = match self.fetcher.fetch_with_retry(&submitted_url(username, self.user_submissions_limit)).await {
            FetchOutcome::Success(body) => parse_listing(body),
            FetchOutcome::Forbidden | FetchOutcome::Banned | FetchOutcome::NotFound => {
                self.mark_suspended(username).await?;
                return Ok(());
            }
            _ => Vec::new(),
        };

        let account_age_days = ((Utc::now().timestamp() as f64 - about.created_utc) / 86_400.0).max(0.0) as i32;
        let post_karma = about.link_karma.unwrap_or(0);
        let comment_karma = about.comment_karma.unwrap_or(0);
        let scores = compute_quality_scores(username, account_age_days, post_karma, comment_karma);

        sqlx::query(
            "INSERT INTO reddit_users (username, account_age_days, post_karma, comment_karma, \
             username_score, age_score, karma_score, overall_score, is_suspended, last_scraped_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,false,now()) \
             ON CONFLICT (username) DO UPDATE SET account_age_days = EXCLUDED.account_age_days, \
             post_karma = EXCLUDED.post_karma, comment_karma = EXCLUDED.comment_karma, \
             username_score = EXCLUDED.username_score, age_score = EXCLUDED.age_score, \
             karma_score = EXCLUDED.karma_score, overall_score = EXCLUDED.overall_score, \
             last_scraped_at = EXCLUDED.last_scraped_at",
        )
        .bind(username)
        .bind(account_age_days)
        .bind(post_karma)
        .bind(comment_karma)
        .bind(scores.username_score)
        .bind(scores.age_score)
        .bind(scores.karma_score)
        .bind(scores.overall_score)
        .execute(&self.pool)
        .await?;

        self.discover_subreddits(&submissions).await?;

        self.logger
            .log(
                crate::models::log_entry::LogLevel::Success,
                format!("✅ Completed u/{} | Overall: {:.2}", username, scores.overall_score),
            )
            .await;
        Ok(())
    }

    async fn mark_suspended(&self, username: &str) -> Result<()> {
        sqlx::query("UPDATE reddit_users SET is_suspended = true, last_scraped_at = now() WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// S5 — discovered subreddits are inserted with `review = unset` and never
    /// overwrite an existing row's review state.
    async fn discover_subreddits(&self, submissions: &[SubmissionData]) -> Result<()> {
        let subreddits: HashSet<&str> = submissions.iter().map(|s| s.subreddit.as_str()).collect();
        for name in subreddits {
            let normalized = name.to_lowercase();
            sqlx::query(
                "INSERT INTO reddit_subreddits (name, review, subscribers, accounts_active) \
                 VALUES ($1, 'Unset', 0, 0) ON CONFLICT (name) DO NOTHING",
            )
            .bind(&normalized)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

fn about_url(username: &str) -> String {
    format!("https://www.reddit.com/user/{}/about.json", username)
}

fn submitted_url(username: &str, limit: u32) -> String {
    format!("https://www.reddit.com/user/{}/submitted.json?limit={}", username, limit)
}

fn parse_listing(body: serde_json::Value) -> Vec<SubmissionData> {
    serde_json::from_value::<Listing<SubmissionData>>(body)
        .map(|listing| listing.data.children.into_iter().map(|c| c.data).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_query_normalizes_names_to_lowercase() {
        // normalize step mirrors `normalize_subreddit_name` in models::subreddit,
        // exercised here without a DB round trip.
        assert_eq!("AskReddit".to_lowercase(), "askreddit");
    }

    #[test]
    fn account_age_days_never_negative() {
        let future_created = Utc::now().timestamp() as f64 + 1_000.0;
        let age = ((Utc::now().timestamp() as f64 - future_created) / 86_400.0).max(0.0) as i32;
        assert_eq!(age, 0);
    }
}
