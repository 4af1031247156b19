use b9_ingestion_core::services::calculator::{compute_quality_scores, compute_subreddit_metrics, PostSample};
use b9_ingestion_core::services::protected_upsert::{protected_merge, ComputedSubredditFields, ExistingSubredditFields};
use b9_ingestion_core::models::subreddit::{ReviewState, SubredditMetrics};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sample_posts(n: usize) -> Vec<PostSample> {
    (0..n)
        .map(|i| PostSample {
            score: (i * 7) as i64,
            num_comments: (i * 2) as i64,
            created_utc: Utc::now() - chrono::Duration::hours(i as i64),
        })
        .collect()
}

fn metrics_benchmark(c: &mut Criterion) {
    let hot = sample_posts(100);
    let top = sample_posts(365);

    c.bench_function("compute_subreddit_metrics_100_hot_365_top", |b| {
        b.iter(|| compute_subreddit_metrics(black_box(&hot), black_box(&top), black_box(50_000), black_box(1.2)))
    });
}

fn quality_score_benchmark(c: &mut Criterion) {
    c.bench_function("compute_quality_scores", |b| {
        b.iter(|| compute_quality_scores(black_box("some_user"), black_box(730), black_box(15_000), black_box(42_000)))
    });
}

fn protected_merge_benchmark(c: &mut Criterion) {
    let existing = ExistingSubredditFields {
        review: ReviewState::Ok,
        primary_category: Some("Unknown".to_string()),
        tags: vec![],
        over18: Some(false),
        subscribers: 10_000,
        accounts_active: 50,
    };
    let computed = ComputedSubredditFields {
        primary_category: Some("fitness/yoga".to_string()),
        tags: vec!["fitness/yoga".to_string()],
        over18: Some(false),
        subscribers: 10_500,
        accounts_active: 60,
        metrics: SubredditMetrics::default(),
    };

    c.bench_function("protected_merge", |b| {
        b.iter(|| protected_merge(black_box(&existing), black_box(&computed)))
    });
}

criterion_group!(benches, metrics_benchmark, quality_score_benchmark, protected_merge_benchmark);
criterion_main!(benches);
