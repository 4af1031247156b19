//! §4.6 "Protected UPSERT policy" and §9's directive to express it as a single
//! pure, unit-testable `protected_merge` function rather than conditionally
//! omitting keys ad hoc at the call site.

use serde::Serialize;

use crate::models::subreddit::{ReviewState, SubredditMetrics};

/// The subset of an existing subreddit row the merge decision depends on.
#[derive(Debug, Clone, Serialize)]
pub struct ExistingSubredditFields {
    pub review: ReviewState,
    pub primary_category: Option<String>,
    pub tags: Vec<String>,
    pub over18: Option<bool>,
    pub subscribers: i64,
    pub accounts_active: i64,
}

/// Freshly fetched/derived values a scrape cycle wants to write.
#[derive(Debug, Clone)]
pub struct ComputedSubredditFields {
    pub primary_category: Option<String>,
    pub tags: Vec<String>,
    pub over18: Option<bool>,
    pub subscribers: i64,
    pub accounts_active: i64,
    pub metrics: SubredditMetrics,
}

/// The fields to actually write. `None` means "leave the column untouched" —
/// distinct from writing an explicit `null`/empty value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertPayload {
    pub primary_category: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub over18: Option<Option<bool>>,
    pub subscribers: Option<i64>,
    pub accounts_active: Option<i64>,
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

/// §4.6 Protected UPSERT policy. Computed metrics and `last_scraped_at` are
/// always written (the caller stamps `last_scraped_at`, not this function,
/// since it's not a domain value).
pub fn protected_merge(existing: &ExistingSubredditFields, computed: &ComputedSubredditFields) -> UpsertPayload {
    let primary_category = if existing.primary_category.as_deref().is_some_and(|c| c != "Unknown") {
        None
    } else {
        Some(computed.primary_category.clone())
    };

    let tags = if existing.tags.is_empty() {
        Some(computed.tags.clone())
    } else {
        None
    };

    let over18 = if existing.over18.is_some() {
        None
    } else {
        Some(computed.over18)
    };

    let subscribers = if existing.subscribers > 0 {
        None
    } else {
        Some(computed.subscribers)
    };

    let accounts_active = if existing.accounts_active > 0 {
        None
    } else {
        Some(computed.accounts_active)
    };

    UpsertPayload {
        primary_category,
        tags,
        over18,
        subscribers,
        accounts_active,
        avg_upvotes_per_post: computed.metrics.avg_upvotes_per_post,
        avg_comments_per_post: computed.metrics.avg_comments_per_post,
        engagement: computed.metrics.engagement,
        subreddit_score: computed.metrics.subreddit_score,
        best_posting_day: computed.metrics.best_posting_day.clone(),
        best_posting_hour: computed.metrics.best_posting_hour,
        min_post_karma: computed.metrics.min_post_karma,
        min_comment_karma: computed.metrics.min_comment_karma,
        min_account_age_days: computed.metrics.min_account_age_days,
    }
}

/// §4.6 Failure semantics: a terminal fetch outcome forces `review` to a
/// terminal state regardless of curation. This is deliberately a separate
/// function from `protected_merge` — it's not part of the "successful fetch"
/// merge and is the only path allowed to write `review`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Banned,
    Forbidden,
    NotFound,
}

pub fn terminal_review_for(outcome: TerminalOutcome) -> ReviewState {
    match outcome {
        TerminalOutcome::Banned => ReviewState::Banned,
        TerminalOutcome::Forbidden => ReviewState::Private,
        TerminalOutcome::NotFound => ReviewState::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computed() -> ComputedSubredditFields {
        ComputedSubredditFields {
            primary_category: Some("Fitness".to_string()),
            tags: vec!["niche:fitness".to_string()],
            over18: Some(true),
            subscribers: 61_000,
            accounts_active: 500,
            metrics: SubredditMetrics {
                avg_upvotes_per_post: 120.0,
                avg_comments_per_post: 10.0,
                engagement: 0.002,
                subreddit_score: 42.0,
                best_posting_day: None,
                best_posting_hour: None,
                min_post_karma: None,
                min_comment_karma: None,
                min_account_age_days: None,
            },
        }
    }

    /// S1 — Protected UPSERT scenario from §8.
    #[test]
    fn s1_protected_upsert_scenario() {
        let existing = ExistingSubredditFields {
            review: ReviewState::Ok,
            primary_category: Some("Style".to_string()),
            tags: vec!["lingerie".to_string(), "bikini".to_string()],
            over18: None,
            subscribers: 50_000,
            accounts_active: 0,
        };

        let payload = protected_merge(&existing, &computed());

        assert_eq!(payload.primary_category, None, "existing category is curated, must not be written");
        assert_eq!(payload.tags, None, "existing tags are non-empty, must not be written");
        assert_eq!(payload.subscribers, None, "existing subscribers > 0, must be preserved");
        assert_eq!(payload.over18, Some(Some(true)), "existing over18 is null, may be written");
        assert_eq!(payload.accounts_active, Some(500), "existing accounts_active is 0, may be written");
        assert_eq!(payload.avg_upvotes_per_post, 120.0, "metrics are always written");
    }

    #[test]
    fn unset_protected_fields_are_writable() {
        let existing = ExistingSubredditFields {
            review: ReviewState::Unset,
            primary_category: None,
            tags: vec![],
            over18: None,
            subscribers: 0,
            accounts_active: 0,
        };

        let payload = protected_merge(&existing, &computed());

        assert_eq!(payload.primary_category, Some(Some("Fitness".to_string())));
        assert_eq!(payload.tags, Some(vec!["niche:fitness".to_string()]));
        assert_eq!(payload.over18, Some(Some(true)));
        assert_eq!(payload.subscribers, Some(61_000));
        assert_eq!(payload.accounts_active, Some(500));
    }

    #[test]
    fn unknown_category_is_treated_as_unset() {
        let existing = ExistingSubredditFields {
            review: ReviewState::Ok,
            primary_category: Some("Unknown".to_string()),
            tags: vec![],
            over18: None,
            subscribers: 0,
            accounts_active: 0,
        };

        let payload = protected_merge(&existing, &computed());
        assert_eq!(payload.primary_category, Some(Some("Fitness".to_string())));
    }

    #[test]
    fn terminal_outcomes_map_to_review_states() {
        assert_eq!(terminal_review_for(TerminalOutcome::Banned), ReviewState::Banned);
        assert_eq!(terminal_review_for(TerminalOutcome::Forbidden), ReviewState::Private);
        assert_eq!(terminal_review_for(TerminalOutcome::NotFound), ReviewState::NotFound);
    }

    use proptest::prelude::*;

    proptest! {
        /// §8 invariant 1, as a property: a curated subreddit (non-empty tags
        /// or a non-"Unknown" category) never has `tags`/`primary_category`
        /// overwritten, whatever the freshly computed values look like.
        #[test]
        fn curated_fields_are_never_overwritten(
            existing_category in "[A-Za-z]{1,10}",
            existing_tags in prop::collection::vec("[a-z]{1,8}", 1..5),
            computed_category in "[A-Za-z]{1,10}",
            computed_tags in prop::collection::vec("[a-z]{1,8}", 0..5),
            subscribers in 0i64..10_000_000,
        ) {
            prop_assume!(existing_category != "Unknown");

            let existing = ExistingSubredditFields {
                review: ReviewState::Ok,
                primary_category: Some(existing_category),
                tags: existing_tags,
                over18: Some(false),
                subscribers,
                accounts_active: 1,
            };
            let mut computed = computed();
            computed.primary_category = Some(computed_category);
            computed.tags = computed_tags;

            let payload = protected_merge(&existing, &computed);

            prop_assert_eq!(payload.primary_category, None);
            prop_assert_eq!(payload.tags, None);
        }
    }
}
