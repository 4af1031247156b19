//! Categorizer (C9, §4.9). The external classifier is an out-of-scope
//! collaborator (§1) consumed through the narrow [`Classifier`] trait; this
//! module owns validation, idempotency, and persistence only.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, info};

use crate::error::{CoreError, Result};
use crate::models::subreddit::{ReviewState, Subreddit};
use crate::models::tags;

#[derive(Debug, Clone, Serialize)]
pub struct SubredditMetadata {
    pub name: String,
    pub display_name: String,
    pub subscribers: i64,
    pub over18: bool,
    pub sample_titles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationResult {
    pub tags: Vec<String>,
    pub primary_category: String,
    pub confidence: f64,
}

/// §4.9 external dependency: `classify(subreddit_metadata) -> (tags[], primary_category, confidence)`.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, metadata: &SubredditMetadata) -> Result<ClassificationResult>;
}

/// OpenAI-backed implementation of the classifier boundary.
pub struct OpenAiClassifier {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiClassifier {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, metadata: &SubredditMetadata) -> Result<ClassificationResult> {
        let registry_listing: Vec<String> = tags::all_tags().collect();
        let prompt = json!({
            "model": "gpt-4o-mini",
            "response_format": { "type": "json_object" },
            "messages": [
                {
                    "role": "system",
                    "content": "Classify the subreddit into 1-2 tags from the provided registry and a primary category. Respond as JSON: {\"tags\": [...], \"primary_category\": \"...\", \"confidence\": 0.0}."
                },
                {
                    "role": "user",
                    "content": json!({ "subreddit": metadata, "registry": registry_listing }).to_string()
                }
            ]
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&prompt)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CoreError::Transient(format!("classifier returned {}", response.status())));
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CoreError::Internal { message: Some("empty classifier response".to_string()) })?;

        serde_json::from_str(&content).map_err(CoreError::from)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CategorizeOutcome {
    Applied { tags: Vec<String>, primary_category: String },
    SkippedAlreadyTagged,
    RejectedAllTagsInvalid,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub processed: u32,
    pub applied: u32,
    pub skipped: u32,
    pub rejected: u32,
}

pub struct Categorizer {
    pool: PgPool,
    classifier: Arc<dyn Classifier>,
}

impl Categorizer {
    pub fn new(pool: PgPool, classifier: Arc<dyn Classifier>) -> Self {
        Self { pool, classifier }
    }

    /// §4.9: idempotent unless `force`. Only operates on curated rows
    /// (`review ∈ {Ok, No Seller}`) with unset tags.
    pub async fn categorize_one(&self, subreddit: &Subreddit, force: bool) -> Result<CategorizeOutcome> {
        if !matches!(subreddit.review, ReviewState::Ok | ReviewState::NoSeller) {
            return Ok(CategorizeOutcome::SkippedAlreadyTagged);
        }
        if !subreddit.tags.is_empty() && !force {
            return Ok(CategorizeOutcome::SkippedAlreadyTagged);
        }

        let metadata = SubredditMetadata {
            name: subreddit.name.clone(),
            display_name: subreddit.display_name.clone().unwrap_or_default(),
            subscribers: subreddit.subscribers,
            over18: subreddit.over18.unwrap_or(false),
            sample_titles: Vec::new(),
        };

        let result = self.classifier.classify(&metadata).await?;
        let valid_tags = tags::validate_tags(&result.tags);

        if valid_tags.is_empty() {
            error!(subreddit = %subreddit.name, returned = ?result.tags, "categorizer: classifier returned no valid tags");
            return Ok(CategorizeOutcome::RejectedAllTagsInvalid);
        }

        let primary_category = tags::primary_category_from_tags(&valid_tags).unwrap_or(result.primary_category);

        sqlx::query("UPDATE reddit_subreddits SET tags = $2, primary_category = $3 WHERE name = $1")
            .bind(&subreddit.name)
            .bind(&valid_tags)
            .bind(&primary_category)
            .execute(&self.pool)
            .await?;

        info!(subreddit = %subreddit.name, tags = ?valid_tags, primary_category, "categorizer: applied");
        Ok(CategorizeOutcome::Applied { tags: valid_tags, primary_category })
    }

    pub async fn run_batch(&self, batch_size: u32, limit: Option<u32>, ids: Option<Vec<String>>) -> Result<BatchSummary> {
        let cap = limit.map(|l| l.min(batch_size)).unwrap_or(batch_size);
        let rows: Vec<Subreddit> = if let Some(ids) = ids {
            sqlx::query_as("SELECT * FROM reddit_subreddits WHERE name = ANY($1) LIMIT $2")
                .bind(&ids)
                .bind(cap as i64)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM reddit_subreddits WHERE review IN ('Ok', 'No Seller') AND cardinality(tags) = 0 LIMIT $1",
            )
            .bind(cap as i64)
            .fetch_all(&self.pool)
            .await?
        };

        let mut summary = BatchSummary::default();
        for row in rows {
            summary.processed += 1;
            match self.categorize_one(&row, false).await {
                Ok(CategorizeOutcome::Applied { .. }) => summary.applied += 1,
                Ok(CategorizeOutcome::SkippedAlreadyTagged) => summary.skipped += 1,
                Ok(CategorizeOutcome::RejectedAllTagsInvalid) => summary.rejected += 1,
                Err(e) => {
                    error!(subreddit = %row.name, error = %e, "categorizer: batch item failed");
                    summary.rejected += 1;
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClassifier(ClassificationResult);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _metadata: &SubredditMetadata) -> Result<ClassificationResult> {
            Ok(self.0.clone())
        }
    }

    fn sample_subreddit(review: ReviewState, tags: Vec<String>) -> Subreddit {
        Subreddit {
            name: "fitgirls".to_string(),
            display_name: Some("FitGirls".to_string()),
            url: Some("/r/fitgirls".to_string()),
            subscribers: 10_000,
            accounts_active: 100,
            over18: Some(true),
            review,
            primary_category: None,
            tags,
            last_scraped_at: None,
            avg_upvotes_per_post: 0.0,
            avg_comments_per_post: 0.0,
            engagement: 0.0,
            subreddit_score: 0.0,
            best_posting_day: None,
            best_posting_hour: None,
            min_post_karma: None,
            min_comment_karma: None,
            min_account_age_days: None,
        }
    }

    #[tokio::test]
    async fn skips_non_curated_subreddits() {
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap();
        let classifier = Arc::new(FixedClassifier(ClassificationResult {
            tags: vec!["niche:fitness".to_string()],
            primary_category: "niche".to_string(),
            confidence: 0.9,
        }));
        let categorizer = Categorizer::new(pool, classifier);
        let subreddit = sample_subreddit(ReviewState::Unset, vec![]);
        let outcome = categorizer.categorize_one(&subreddit, false).await.unwrap();
        assert_eq!(outcome, CategorizeOutcome::SkippedAlreadyTagged);
    }

    #[tokio::test]
    async fn skips_already_tagged_without_force() {
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap();
        let classifier = Arc::new(FixedClassifier(ClassificationResult {
            tags: vec!["niche:fitness".to_string()],
            primary_category: "niche".to_string(),
            confidence: 0.9,
        }));
        let categorizer = Categorizer::new(pool, classifier);
        let subreddit = sample_subreddit(ReviewState::Ok, vec!["niche:cosplay".to_string()]);
        let outcome = categorizer.categorize_one(&subreddit, false).await.unwrap();
        assert_eq!(outcome, CategorizeOutcome::SkippedAlreadyTagged);
    }
}
