//! Proxy Pool (C2, §4.2): rotation, health tracking and User-Agent cycling
//! for outbound scrape requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::seq::SliceRandom;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::models::Proxy;

const FAILURE_THRESHOLD: u32 = 3;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// §4.2 circuit bookkeeping, one per proxy. Mirrors the provider-level
/// circuit breaker used elsewhere in this codebase but keyed per proxy
/// instead of per upstream provider.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct ProxyState {
    proxy: Proxy,
    circuit: CircuitState,
    consecutive_failures: u32,
}

impl ProxyState {
    fn is_available(&self) -> bool {
        self.proxy.enabled && self.circuit != CircuitState::Open
    }
}

pub struct ProxyPool {
    pool: PgPool,
    proxies: RwLock<Vec<ProxyState>>,
    cursor: AtomicUsize,
}

impl ProxyPool {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            proxies: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// §4.2: loads all enabled proxies from the `proxies` table.
    pub async fn load(&self) -> Result<usize> {
        let rows: Vec<Proxy> = sqlx::query_as("SELECT * FROM proxies WHERE enabled = true")
            .fetch_all(&self.pool)
            .await?;

        let count = rows.len();
        let mut guard = self.proxies.write().await;
        *guard = rows
            .into_iter()
            .map(|proxy| ProxyState {
                proxy,
                circuit: CircuitState::Closed,
                consecutive_failures: 0,
            })
            .collect();
        info!(count, "proxy pool loaded");
        Ok(count)
    }

    /// Count of proxies currently eligible for rotation (§4.1's `worker_count`
    /// input).
    pub async fn working_count(&self) -> usize {
        self.proxies.read().await.iter().filter(|p| p.is_available()).count()
    }

    /// §4.2: round-robin selection over available proxies. Returns
    /// `CoreError::ProxyExhausted` when none are available.
    pub async fn next(&self) -> Result<Proxy> {
        let guard = self.proxies.read().await;
        let available: Vec<&ProxyState> = guard.iter().filter(|p| p.is_available()).collect();
        if available.is_empty() {
            return Err(CoreError::ProxyExhausted);
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % available.len();
        Ok(available[idx].proxy.clone())
    }

    /// §4.2: records the outcome of using a proxy. Three consecutive failures
    /// trip the circuit open; any success resets the counter and closes it.
    pub async fn report(&self, proxy_id: &str, ok: bool) {
        let mut guard = self.proxies.write().await;
        let Some(state) = guard.iter_mut().find(|p| p.proxy.id == proxy_id) else {
            return;
        };

        if ok {
            state.proxy.success_count += 1;
            state.proxy.last_ok_at = Some(chrono::Utc::now());
            state.consecutive_failures = 0;
            state.circuit = CircuitState::Closed;
        } else {
            state.proxy.failure_count += 1;
            state.consecutive_failures += 1;
            if state.consecutive_failures >= FAILURE_THRESHOLD {
                if state.circuit != CircuitState::Open {
                    warn!(proxy = proxy_id, "proxy tripped to open after {} consecutive failures", state.consecutive_failures);
                }
                state.circuit = CircuitState::Open;
            }
        }
    }

    /// Gives a previously-tripped proxy another chance; called by a periodic
    /// re-test sweep rather than automatically after a timeout, since
    /// §4.2 ties recovery to an explicit `test_all` pass.
    pub async fn half_open(&self, proxy_id: &str) {
        let mut guard = self.proxies.write().await;
        if let Some(state) = guard.iter_mut().find(|p| p.proxy.id == proxy_id) {
            if state.circuit == CircuitState::Open {
                state.circuit = CircuitState::HalfOpen;
            }
        }
    }

    /// §4.2: probes every loaded proxy with a cheap request and updates its
    /// health, re-opening the circuit for any that respond.
    pub async fn test_all(&self, probe_url: &str) {
        let ids: Vec<String> = self.proxies.read().await.iter().map(|p| p.proxy.id.clone()).collect();
        for id in ids {
            self.half_open(&id).await;
            let proxy = {
                let guard = self.proxies.read().await;
                guard.iter().find(|p| p.proxy.id == id).map(|p| p.proxy.clone())
            };
            let Some(proxy) = proxy else { continue };

            let client = match reqwest::Client::builder()
                .proxy(reqwest::Proxy::all(proxy.reqwest_proxy_url()).unwrap_or_else(|_| reqwest::Proxy::all(probe_url).unwrap()))
                .timeout(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(c) => c,
                Err(_) => {
                    self.report(&id, false).await;
                    continue;
                }
            };

            let ok = client.get(probe_url).send().await.is_ok_and(|r| r.status().is_success());
            self.report(&id, ok).await;
        }
    }

    /// Fresh random User-Agent for each request (§4.2).
    pub fn user_agent(&self) -> &'static str {
        USER_AGENTS.choose(&mut rand::thread_rng()).copied().unwrap_or(USER_AGENTS[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_proxy(id: &str) -> Proxy {
        Proxy {
            id: id.to_string(),
            endpoint: "1.2.3.4:8080".to_string(),
            display_name: None,
            enabled: true,
            success_count: 0,
            failure_count: 0,
            last_ok_at: None,
        }
    }

    fn states(ids: &[&str]) -> Vec<ProxyState> {
        ids.iter()
            .map(|id| ProxyState {
                proxy: sample_proxy(id),
                circuit: CircuitState::Closed,
                consecutive_failures: 0,
            })
            .collect()
    }

    #[tokio::test]
    async fn next_round_robins_over_available_proxies() {
        let pool = ProxyPool {
            pool: sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap(),
            proxies: RwLock::new(states(&["a", "b"])),
            cursor: AtomicUsize::new(0),
        };

        let first = pool.next().await.unwrap();
        let second = pool.next().await.unwrap();
        let third = pool.next().await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.id, third.id);
    }

    #[tokio::test]
    async fn next_errors_when_exhausted() {
        let pool = ProxyPool {
            pool: sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap(),
            proxies: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        };
        assert!(matches!(pool.next().await, Err(CoreError::ProxyExhausted)));
    }

    #[tokio::test]
    async fn three_consecutive_failures_trip_the_circuit() {
        let pool = ProxyPool {
            pool: sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap(),
            proxies: RwLock::new(states(&["a"])),
            cursor: AtomicUsize::new(0),
        };

        pool.report("a", false).await;
        pool.report("a", false).await;
        assert!(pool.next().await.is_ok());
        pool.report("a", false).await;
        assert!(matches!(pool.next().await, Err(CoreError::ProxyExhausted)));
    }

    #[tokio::test]
    async fn success_resets_failure_count_and_closes_circuit() {
        let pool = ProxyPool {
            pool: sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap(),
            proxies: RwLock::new(states(&["a"])),
            cursor: AtomicUsize::new(0),
        };

        pool.report("a", false).await;
        pool.report("a", false).await;
        pool.report("a", true).await;
        pool.report("a", false).await;
        pool.report("a", false).await;
        assert!(pool.next().await.is_ok(), "two failures after a reset shouldn't trip the circuit");
    }
}
