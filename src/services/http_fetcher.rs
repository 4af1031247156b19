//! HTTP Fetcher (C3, §4.3): single-request retry/backoff with status
//! classification and proxy pool integration. Never throws to callers — every
//! call resolves to a tagged [`FetchOutcome`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::info;

use crate::models::Proxy;
use crate::services::proxy_pool::ProxyPool;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RATE_LIMIT_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_SECS: f64 = 0.1;

/// Tagged fetch result (§4.3, §7). Higher components translate this to
/// domain errors; the fetcher itself never returns a `Result`.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(serde_json::Value),
    Banned,
    NotFound,
    Forbidden,
    RateLimited,
    Transient(String),
    Timeout(String),
}

#[derive(Debug, Deserialize)]
struct RedditErrorBody {
    reason: Option<String>,
}

pub struct HttpFetcher {
    client: reqwest::Client,
    proxy_pool: Arc<ProxyPool>,
    max_retries: u32,
    base_delay_secs: f64,
}

impl HttpFetcher {
    pub fn new(proxy_pool: Arc<ProxyPool>, max_retries: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            proxy_pool,
            max_retries,
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
        }
    }

    /// §4.3: single-request primitive against one proxy. Headers always
    /// include a freshly generated User-Agent.
    async fn fetch_once(&self, url: &str, proxy: &Proxy) -> FetchOutcome {
        let started = Instant::now();
        let proxy_layer = match reqwest::Proxy::all(proxy.reqwest_proxy_url()) {
            Ok(p) => p,
            Err(e) => return FetchOutcome::Transient(e.to_string()),
        };

        let client = match reqwest::Client::builder()
            .proxy(proxy_layer)
            .timeout(REQUEST_TIMEOUT)
            .build()
        {
            Ok(c) => c,
            Err(e) => return FetchOutcome::Transient(e.to_string()),
        };

        let result = client
            .get(url)
            .header("User-Agent", self.proxy_pool.user_agent())
            .send()
            .await;

        let elapsed_ms = started.elapsed().as_millis();

        let response = match result {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                info!(endpoint = url, status = "timeout", response_time_ms = elapsed_ms, "fetch");
                self.proxy_pool.report(&proxy.id, false).await;
                return FetchOutcome::Timeout(e.to_string());
            }
            Err(e) => {
                info!(endpoint = url, status = "transport_error", response_time_ms = elapsed_ms, "fetch");
                self.proxy_pool.report(&proxy.id, false).await;
                return FetchOutcome::Transient(e.to_string());
            }
        };

        let status = response.status();
        info!(endpoint = url, status = status.as_u16(), response_time_ms = elapsed_ms, "fetch");

        match status.as_u16() {
            200 => match response.json::<serde_json::Value>().await {
                Ok(body) => {
                    self.proxy_pool.report(&proxy.id, true).await;
                    FetchOutcome::Success(body)
                }
                Err(e) => FetchOutcome::Transient(e.to_string()),
            },
            404 => {
                let is_banned = response
                    .json::<RedditErrorBody>()
                    .await
                    .ok()
                    .and_then(|b| b.reason)
                    .is_some_and(|reason| reason == "banned");
                if is_banned {
                    FetchOutcome::Banned
                } else {
                    FetchOutcome::NotFound
                }
            }
            403 => FetchOutcome::Forbidden,
            429 => FetchOutcome::RateLimited,
            500..=599 => {
                self.proxy_pool.report(&proxy.id, false).await;
                FetchOutcome::Transient(format!("server error {}", status.as_u16()))
            }
            other => FetchOutcome::Transient(format!("unexpected status {}", other)),
        }
    }

    /// §4.3: full retry/backoff policy on top of [`fetch_once`]. Picks a
    /// fresh proxy from the pool for every attempt.
    pub async fn fetch_with_retry(&self, url: &str) -> FetchOutcome {
        let mut rate_limit_attempt: u32 = 0;
        let mut transient_attempt: u32 = 0;

        loop {
            let proxy = match self.proxy_pool.next().await {
                Ok(p) => p,
                Err(_) => return FetchOutcome::Transient("no working proxy available".to_string()),
            };

            match self.fetch_once(url, &proxy).await {
                FetchOutcome::RateLimited => {
                    if rate_limit_attempt >= MAX_RATE_LIMIT_ATTEMPTS {
                        return FetchOutcome::RateLimited;
                    }
                    let sleep_secs = (5 + 2 * rate_limit_attempt).min(30);
                    rate_limit_attempt += 1;
                    tokio::time::sleep(Duration::from_secs(sleep_secs as u64)).await;
                }
                FetchOutcome::Transient(msg) => {
                    transient_attempt += 1;
                    if transient_attempt > self.max_retries {
                        return FetchOutcome::Transient(msg);
                    }
                    let backoff = Duration::from_secs_f64(self.base_delay_secs * transient_attempt as f64);
                    tokio::time::sleep(backoff).await;
                }
                FetchOutcome::Timeout(msg) => {
                    transient_attempt += 1;
                    if transient_attempt > self.max_retries {
                        return FetchOutcome::Timeout(msg);
                    }
                    let backoff = Duration::from_secs_f64(self.base_delay_secs * transient_attempt as f64);
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    /// S3 — rate-limit backoff formula from §8: three 429s in a row sleep
    /// 5s, 7s, 9s (min(5+2*attempt, 30), attempt counted from 0).
    #[test]
    fn rate_limit_backoff_formula_matches_s3() {
        let delays: Vec<u64> = (0..=2).map(|attempt| (5 + 2 * attempt).min(30)).collect();
        assert_eq!(delays, vec![5, 7, 9]);
    }

    #[test]
    fn rate_limit_backoff_caps_at_30() {
        let delay = (5u64 + 2 * 20).min(30);
        assert_eq!(delay, 30);
    }
}
