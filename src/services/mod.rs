// Core ingestion services (C1-C10, §4).
pub mod calculator;
pub mod categorizer;
pub mod config_store;
pub mod control_plane;
pub mod http_fetcher;
pub mod instagram_scraper;
pub mod log_cleanup;
pub mod logger;
pub mod protected_upsert;
pub mod proxy_pool;
pub mod subreddit_scraper;
pub mod user_scraper;

pub use categorizer::{Categorizer, Classifier, OpenAiClassifier};
pub use config_store::{ConfigStore, ScraperOptions};
pub use control_plane::ControlPlane;
pub use http_fetcher::{FetchOutcome, HttpFetcher};
pub use instagram_scraper::InstagramScraper;
pub use log_cleanup::{CleanupSummary, LogCleanupJob};
pub use logger::StructuredLogger;
pub use proxy_pool::ProxyPool;
pub use subreddit_scraper::{SubredditCache, SubredditScraper};
pub use user_scraper::UserScraper;
