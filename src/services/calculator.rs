//! Pure metric/score computation (§4.6, §4.7). No I/O, fully unit-testable.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::models::subreddit::SubredditMetrics;

/// Minimal view of a fetched post, enough to compute subreddit metrics.
#[derive(Debug, Clone)]
pub struct PostSample {
    pub score: i64,
    pub num_comments: i64,
    pub created_utc: DateTime<Utc>,
}

/// Normalization ceilings for the subreddit_score composite. `spec.md` §4.6
/// specifies the weights (0.5/0.3/0.2) but not the normalization curve; these
/// ceilings are this implementation's choice, recorded in DESIGN.md.
const UPVOTE_NORMALIZE_CEILING: f64 = 1000.0;
const ENGAGEMENT_NORMALIZE_CEILING: f64 = 0.01;
const POST_FREQUENCY_NORMALIZE_CEILING: f64 = 5.0;

fn normalize(value: f64, ceiling: f64) -> f64 {
    if ceiling <= 0.0 {
        return 0.0;
    }
    (value / ceiling * 100.0).clamp(0.0, 100.0)
}

/// §4.6 metric computation: a pure function over a subreddit's fetched posts.
///
/// `top_posts` is used only for the best-posting-time buckets (it's the
/// `top.json?t=year` set); `hot_posts` drives the averages and engagement.
/// `post_frequency_per_day` is supplied by the caller (derived from the span
/// of `top_posts`), since the raw fetch doesn't carry enough history alone.
pub fn compute_subreddit_metrics(
    hot_posts: &[PostSample],
    top_posts: &[PostSample],
    subscribers: i64,
    post_frequency_per_day: f64,
) -> SubredditMetrics {
    let avg_upvotes_per_post = mean(hot_posts.iter().map(|p| p.score as f64));
    let avg_comments_per_post = mean(hot_posts.iter().map(|p| p.num_comments as f64));

    let engagement = if subscribers > 0 {
        avg_upvotes_per_post / subscribers as f64
    } else {
        0.0
    };

    let subreddit_score = 0.5 * normalize(avg_upvotes_per_post, UPVOTE_NORMALIZE_CEILING)
        + 0.3 * normalize(engagement, ENGAGEMENT_NORMALIZE_CEILING)
        + 0.2 * normalize(post_frequency_per_day, POST_FREQUENCY_NORMALIZE_CEILING);

    let (best_posting_day, best_posting_hour) = if engagement > 0.01 {
        best_posting_time(top_posts)
    } else {
        (None, None)
    };

    SubredditMetrics {
        avg_upvotes_per_post,
        avg_comments_per_post,
        engagement,
        subreddit_score,
        best_posting_day,
        best_posting_hour,
        // Karma/age floors require the caller's author sample (§4.6), not posts alone.
        min_post_karma: None,
        min_comment_karma: None,
        min_account_age_days: None,
    }
}

fn mean(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let count = values.clone().count();
    if count == 0 {
        0.0
    } else {
        values.sum::<f64>() / count as f64
    }
}

const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// argmax over (weekday, hour) buckets of top-post timestamps (§4.6).
fn best_posting_time(top_posts: &[PostSample]) -> (Option<String>, Option<i32>) {
    if top_posts.is_empty() {
        return (None, None);
    }

    let mut buckets: std::collections::HashMap<(u32, u32), usize> = std::collections::HashMap::new();
    for post in top_posts {
        let weekday = post.created_utc.weekday().num_days_from_monday();
        let hour = post.created_utc.hour();
        *buckets.entry((weekday, hour)).or_insert(0) += 1;
    }

    buckets
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|((weekday, hour), _)| (Some(WEEKDAYS[weekday as usize].to_string()), Some(hour as i32)))
        .unwrap_or((None, None))
}

/// Lower-quartile karma/age floors (§4.6), computed only when ≥10 distinct
/// authors are available.
#[derive(Debug, Clone)]
pub struct AuthorSample {
    pub post_karma: i64,
    pub comment_karma: i64,
    pub account_age_days: i32,
}

pub fn compute_author_floors(authors: &[AuthorSample]) -> (Option<i64>, Option<i64>, Option<i32>) {
    if authors.len() < 10 {
        return (None, None, None);
    }
    (
        Some(lower_quartile_i64(authors.iter().map(|a| a.post_karma))),
        Some(lower_quartile_i64(authors.iter().map(|a| a.comment_karma))),
        Some(lower_quartile_i32(authors.iter().map(|a| a.account_age_days))),
    )
}

fn lower_quartile_i64(values: impl Iterator<Item = i64>) -> i64 {
    let mut sorted: Vec<i64> = values.collect();
    sorted.sort_unstable();
    let idx = sorted.len() / 4;
    sorted[idx.min(sorted.len() - 1)]
}

fn lower_quartile_i32(values: impl Iterator<Item = i32>) -> i32 {
    let mut sorted: Vec<i32> = values.collect();
    sorted.sort_unstable();
    let idx = sorted.len() / 4;
    sorted[idx.min(sorted.len() - 1)]
}

/// §4.7 step 3: username/age/karma/overall quality scores for a Reddit user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScores {
    pub username_score: f64,
    pub age_score: f64,
    pub karma_score: f64,
    pub overall_score: f64,
}

pub fn compute_quality_scores(username: &str, account_age_days: i32, post_karma: i64, comment_karma: i64) -> QualityScores {
    let username_score = username_score(username);
    let age_score = age_score(account_age_days);
    let karma_score = karma_score(post_karma + comment_karma);
    let overall_score = round2(0.2 * username_score + 0.3 * age_score + 0.5 * karma_score);

    QualityScores {
        username_score,
        age_score,
        karma_score,
        overall_score,
    }
}

fn username_score(username: &str) -> f64 {
    let digit_count = username.chars().filter(|c| c.is_ascii_digit()).count();
    let underscore_count = username.chars().filter(|&c| c == '_').count();
    let len = username.chars().count();

    let mut score: f64 = 100.0;
    score -= (digit_count as f64 * 5.0).min(30.0);
    score -= (underscore_count as f64 * 10.0).min(20.0);
    if len < 4 {
        score -= 20.0;
    }
    if (6..=15).contains(&len) {
        score += 10.0;
    }
    score.clamp(0.0, 100.0)
}

fn age_score(account_age_days: i32) -> f64 {
    match account_age_days {
        d if d < 30 => 20.0,
        d if d < 90 => 40.0,
        d if d < 180 => 60.0,
        d if d < 365 => 80.0,
        _ => 100.0,
    }
}

fn karma_score(total_karma: i64) -> f64 {
    match total_karma {
        k if k < 100 => 20.0,
        k if k < 500 => 40.0,
        k if k < 1000 => 60.0,
        k if k < 5000 => 80.0,
        _ => 100.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn s4_user_score_scenario() {
        // username="ab12_c" (len 6, 2 digits, 1 underscore), age=400, karma=6000.
        let scores = compute_quality_scores("ab12_c", 400, 3000, 3000);
        assert_eq!(scores.username_score, 90.0);
        assert_eq!(scores.age_score, 100.0);
        assert_eq!(scores.karma_score, 100.0);
        assert_eq!(scores.overall_score, 98.0);
    }

    #[test]
    fn username_score_penalizes_digits_and_underscores_with_caps() {
        // 10 digits would be -50 uncapped; capped at -30.
        assert_eq!(username_score("a1234567890"), 70.0);
        assert_eq!(username_score("a___________"), 80.0);
    }

    #[test]
    fn username_score_short_name_penalty() {
        assert_eq!(username_score("abc"), 80.0);
    }

    #[test]
    fn s2_zero_engagement_suppresses_best_posting_time() {
        let hot = vec![PostSample {
            score: 0,
            num_comments: 0,
            created_utc: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }];
        let metrics = compute_subreddit_metrics(&hot, &hot, 100_000, 1.0);
        assert_eq!(metrics.engagement, 0.0);
        assert_eq!(metrics.best_posting_day, None);
        assert_eq!(metrics.best_posting_hour, None);
    }

    #[test]
    fn engagement_zero_subscribers_is_zero_not_nan() {
        let hot = vec![PostSample {
            score: 100,
            num_comments: 5,
            created_utc: Utc::now(),
        }];
        let metrics = compute_subreddit_metrics(&hot, &hot, 0, 1.0);
        assert_eq!(metrics.engagement, 0.0);
    }

    #[test]
    fn best_posting_time_picks_most_common_bucket() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(); // Monday 12h
        let t2 = Utc.with_ymd_and_hms(2024, 1, 8, 12, 0, 0).unwrap(); // Monday 12h
        let t3 = Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap(); // Tuesday 5h
        let posts: Vec<PostSample> = [t1, t2, t3]
            .into_iter()
            .map(|created_utc| PostSample {
                score: 10,
                num_comments: 1,
                created_utc,
            })
            .collect();
        let (day, hour) = best_posting_time(&posts);
        assert_eq!(day, Some("Monday".to_string()));
        assert_eq!(hour, Some(12));
    }

    #[test]
    fn author_floors_require_at_least_10_authors() {
        let few: Vec<AuthorSample> = (0..5)
            .map(|i| AuthorSample {
                post_karma: i,
                comment_karma: i,
                account_age_days: i as i32,
            })
            .collect();
        assert_eq!(compute_author_floors(&few), (None, None, None));

        let many: Vec<AuthorSample> = (0..12)
            .map(|i| AuthorSample {
                post_karma: i * 10,
                comment_karma: i * 5,
                account_age_days: i as i32 * 30,
            })
            .collect();
        let (post_floor, comment_floor, age_floor) = compute_author_floors(&many);
        assert!(post_floor.is_some());
        assert!(comment_floor.is_some());
        assert!(age_floor.is_some());
    }
}
