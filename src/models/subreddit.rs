//! Subreddit entity (§3) and its protected-field policy support types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Curator-assigned classification controlling scraper behavior (§3, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "PascalCase")]
pub enum ReviewState {
    Unset,
    Ok,
    #[sqlx(rename = "No Seller")]
    #[serde(rename = "No Seller")]
    NoSeller,
    #[sqlx(rename = "Non Related")]
    #[serde(rename = "Non Related")]
    NonRelated,
    #[sqlx(rename = "User Feed")]
    #[serde(rename = "User Feed")]
    UserFeed,
    Banned,
    Private,
    NotFound,
}

impl ReviewState {
    /// `review ∈ {Ok, No Seller}` is the set eligible for scraping per §4.6 step 1.
    pub fn is_scrapeable(&self) -> bool {
        matches!(self, ReviewState::Ok | ReviewState::NoSeller)
    }

    /// `review ∈ {Ok, No Seller}` also gates whether `primary_category`/`tags`
    /// are protected (§3 invariants, §8 invariant 1).
    pub fn is_curated(&self) -> bool {
        self.is_scrapeable()
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewState::Unset => "unset",
            ReviewState::Ok => "Ok",
            ReviewState::NoSeller => "No Seller",
            ReviewState::NonRelated => "Non Related",
            ReviewState::UserFeed => "User Feed",
            ReviewState::Banned => "Banned",
            ReviewState::Private => "Private",
            ReviewState::NotFound => "NotFound",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ReviewState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" | "" => Ok(ReviewState::Unset),
            "Ok" => Ok(ReviewState::Ok),
            "No Seller" => Ok(ReviewState::NoSeller),
            "Non Related" => Ok(ReviewState::NonRelated),
            "User Feed" => Ok(ReviewState::UserFeed),
            "Banned" => Ok(ReviewState::Banned),
            "Private" => Ok(ReviewState::Private),
            "NotFound" => Ok(ReviewState::NotFound),
            other => Err(format!("unknown review state: {}", other)),
        }
    }
}

/// Computed per-cycle metrics (§4.6), kept distinct from the persisted fields
/// so `protected_merge` can reason about "always write" vs "conditionally write".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubredditMetrics {
    pub avg_upvotes_per_post: f64,
    pub avg_comments_per_post: f64,
    pub engagement: f64,
    pub subreddit_score: f64,
    pub best_posting_day: Option<String>,
    pub best_posting_hour: Option<i32>,
    pub min_post_karma: Option<i64>,
    pub min_comment_karma: Option<i64>,
    pub min_account_age_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subreddit {
    pub name: String,
    pub display_name: Option<String>,
    pub url: Option<String>,
    pub subscribers: i64,
    pub accounts_active: i64,
    pub over18: Option<bool>,
    pub review: ReviewState,
    pub primary_category: Option<String>,
    pub tags: Vec<String>,
    pub last_scraped_at: Option<DateTime<Utc>>,

    pub avg_upvotes_per_post: f64,
    pub avg_comments_per_post: f64,
    pub engagement: f64,
    pub subreddit_score: f64,
    pub best_posting_day: Option<String>,
    pub best_posting_hour: Option<i32>,
    pub min_post_karma: Option<i64>,
    pub min_comment_karma: Option<i64>,
    pub min_account_age_days: Option<i32>,
}

/// Normalizes a raw subreddit name per §3 invariants: lower-case, restricted
/// to `[a-z0-9_]`, 1-50 chars.
pub fn normalize_subreddit_name(raw: &str) -> Result<String, String> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() || lowered.len() > 50 {
        return Err(format!("subreddit name length out of range: {}", lowered.len()));
    }
    if !lowered
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(format!("subreddit name has invalid characters: {}", lowered));
    }
    Ok(lowered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_trims() {
        assert_eq!(normalize_subreddit_name(" AskReddit ").unwrap(), "askreddit");
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(normalize_subreddit_name("ask-reddit").is_err());
    }

    #[test]
    fn rejects_empty_and_too_long() {
        assert!(normalize_subreddit_name("").is_err());
        assert!(normalize_subreddit_name(&"a".repeat(51)).is_err());
    }

    #[test]
    fn review_state_scrapeable_set() {
        assert!(ReviewState::Ok.is_scrapeable());
        assert!(ReviewState::NoSeller.is_scrapeable());
        assert!(!ReviewState::Unset.is_scrapeable());
        assert!(!ReviewState::Banned.is_scrapeable());
    }

    use rstest::rstest;

    #[rstest]
    #[case("AskReddit", "askreddit")]
    #[case("  spaced_out  ", "spaced_out")]
    #[case("UPPER_123", "upper_123")]
    fn normalizes_a_table_of_inputs(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_subreddit_name(input).unwrap(), expected);
    }

    #[rstest]
    #[case("ask-reddit")]
    #[case("ask reddit")]
    #[case("")]
    #[case("ask!reddit")]
    fn rejects_a_table_of_invalid_inputs(#[case] input: &str) {
        assert!(normalize_subreddit_name(input).is_err());
    }
}
