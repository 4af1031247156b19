//! Instagram creator + media entities (§3, §4.8), plus the growth-tracking
//! time series that the original Python scraper maintains but spec.md leaves
//! unspecified in storage shape (see SPEC_FULL.md §4.8 "Supplemented").

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InstagramCreator {
    pub ig_user_id: String,
    pub username: String,
    pub enabled: bool,
    pub followers_count: i64,
    pub following_count: i64,
    pub media_count: i64,
    pub niche: Option<String>,
    pub review_status: String,
    pub profile_pic_url: Option<String>,

    pub avg_views_per_reel: f64,
    pub avg_engagement_per_post: f64,
    pub engagement_rate: f64,

    pub last_scraped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum MediaKind {
    Reel,
    Post,
}

/// Reel/IGPost (§3): unique key `media_pk`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IgMedia {
    pub media_pk: String,
    pub creator_id: String,
    pub kind: MediaKind,
    pub taken_at: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
    pub view_count: Option<i64>,
    pub media_urls: Vec<String>,
    pub is_viral: bool,
}

/// One row per creator per day: supports daily/weekly growth-rate computation
/// (§4.8 step 6) without relying on scanning the full media history.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowerSnapshot {
    pub creator_id: String,
    pub snapshot_date: NaiveDate,
    pub followers_count: i64,
    pub daily_growth_rate: Option<f64>,
    pub weekly_growth_rate: Option<f64>,
}

/// Growth rate between two follower counts, as a fraction (0.05 == +5%).
/// `None` when the prior count is zero (division is undefined, not infinite growth).
pub fn growth_rate(previous: i64, current: i64) -> Option<f64> {
    if previous == 0 {
        None
    } else {
        Some((current - previous) as f64 / previous as f64)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstagramAnalytics {
    pub engagement_rate: f64,
    pub avg_views_per_reel: f64,
    pub avg_engagement_per_post: f64,
}

/// §4.8 step 5: viral when `view_count >= max(50_000, 5 * avg_views)`.
pub fn is_viral(view_count: i64, avg_views: f64) -> bool {
    let threshold = 50_000.0_f64.max(5.0 * avg_views);
    (view_count as f64) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_rate_basic() {
        assert_eq!(growth_rate(100, 110), Some(0.1));
        assert_eq!(growth_rate(0, 50), None);
        assert_eq!(growth_rate(100, 90), Some(-0.1));
    }

    #[test]
    fn viral_uses_floor_of_50k() {
        assert!(is_viral(50_000, 1_000.0));
        assert!(!is_viral(49_999, 1_000.0));
    }

    #[test]
    fn viral_scales_with_average() {
        assert!(is_viral(60_000, 11_000.0));
        assert!(!is_viral(54_000, 11_000.0));
    }
}
