//! Post entity (§3): a Reddit submission plus mirror fields copied from its
//! parent subreddit at insert time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostType {
    Self_,
    Link,
    Image,
    Video,
    Gallery,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub reddit_id: String,
    pub title: String,
    pub author: String,
    pub subreddit_name: String,
    pub created_utc: DateTime<Utc>,
    pub score: i64,
    pub upvote_ratio: f64,
    pub num_comments: i64,

    pub over_18: bool,
    pub spoiler: bool,
    pub stickied: bool,
    pub locked: bool,
    pub is_self: bool,
    pub is_video: bool,
    pub is_gallery: bool,

    pub permalink: String,
    pub url: String,
    pub domain: String,
    pub selftext: String,
    pub post_type: String,

    /// Mirror fields (§4.6): the parent subreddit's values at insert time.
    pub sub_primary_category: Option<String>,
    pub sub_tags: Vec<String>,
    pub sub_over18: Option<bool>,
}

/// §3: `selftext` truncated to 2000 chars.
pub const SELFTEXT_MAX_CHARS: usize = 2000;

pub fn truncate_selftext(raw: &str) -> String {
    if raw.chars().count() <= SELFTEXT_MAX_CHARS {
        raw.to_string()
    } else {
        raw.chars().take(SELFTEXT_MAX_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_selftext() {
        let long = "x".repeat(2500);
        assert_eq!(truncate_selftext(&long).chars().count(), 2000);
    }

    #[test]
    fn leaves_short_selftext_untouched() {
        assert_eq!(truncate_selftext("short"), "short");
    }
}
