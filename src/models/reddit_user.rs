//! RedditUser entity (§3) and quality-score fields (§4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RedditUser {
    pub username: String,
    pub account_age_days: i32,
    pub post_karma: i64,
    pub comment_karma: i64,
    pub username_score: f64,
    pub age_score: f64,
    pub karma_score: f64,
    pub overall_score: f64,
    pub is_suspended: bool,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

/// Normalizes/validates a username per §3: 1-20 chars, not a Reddit system account.
pub fn normalize_username(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 20 {
        return Err(format!("username length out of range: {}", trimmed.chars().count()));
    }
    if matches!(trimmed, "[deleted]" | "AutoModerator") {
        return Err(format!("system account is not a valid user: {}", trimmed));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_system_accounts() {
        assert!(normalize_username("AutoModerator").is_err());
        assert!(normalize_username("[deleted]").is_err());
    }

    #[test]
    fn rejects_too_long() {
        assert!(normalize_username(&"a".repeat(21)).is_err());
    }

    #[test]
    fn accepts_ordinary_username() {
        assert_eq!(normalize_username(" some_user ").unwrap(), "some_user");
    }
}
