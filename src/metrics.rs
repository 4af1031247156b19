//! Prometheus metrics for the ingestion core (ambient observability, carried
//! forward regardless of spec Non-goals on product-facing metrics endpoints).
//!
//! Covers the HTTP surface (C11), the DB pool, and the scrape/categorize
//! cycles themselves (C2, C6-C9) so `/metrics` reflects what the scrapers are
//! actually doing, not just request counts.

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    Json,
};
use prometheus::proto::MetricType;
use prometheus::{Counter, CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    http_requests_total: CounterVec,
    http_request_duration: HistogramVec,
    http_requests_in_flight: Gauge,

    db_connections_active: Gauge,
    db_connections_idle: Gauge,
    db_query_duration: HistogramVec,
    db_operations_total: CounterVec,

    fetch_total: CounterVec,
    fetch_duration: HistogramVec,

    scrape_cycle_duration: HistogramVec,
    scrape_cycle_items: GaugeVec,

    proxy_pool_working: Gauge,
    proxy_pool_tripped: Gauge,

    categorization_total: CounterVec,
    categorization_cost_dollars: Counter,

    instagram_requests_total: Counter,
    instagram_cost_dollars: Counter,

    process_start: Instant,
}

impl MetricsCollector {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("ingestion_http_requests_total", "Total HTTP requests handled"),
            &["method", "path", "status"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new("ingestion_http_request_duration_seconds", "HTTP request latency"),
            &["method", "path"],
        )?;
        let http_requests_in_flight =
            Gauge::new("ingestion_http_requests_in_flight", "Requests currently being handled")?;

        let db_connections_active = Gauge::new("ingestion_db_connections_active", "Active DB pool connections")?;
        let db_connections_idle = Gauge::new("ingestion_db_connections_idle", "Idle DB pool connections")?;
        let db_query_duration = HistogramVec::new(
            HistogramOpts::new("ingestion_db_query_duration_seconds", "DB query latency"),
            &["operation", "table"],
        )?;
        let db_operations_total = CounterVec::new(
            Opts::new("ingestion_db_operations_total", "Total DB operations"),
            &["operation", "table", "status"],
        )?;

        let fetch_total = CounterVec::new(
            Opts::new("ingestion_fetch_total", "HTTP fetches to upstream providers (C2/C3)"),
            &["provider", "outcome"],
        )?;
        let fetch_duration = HistogramVec::new(
            HistogramOpts::new("ingestion_fetch_duration_seconds", "Upstream fetch latency"),
            &["provider"],
        )?;

        let scrape_cycle_duration = HistogramVec::new(
            HistogramOpts::new("ingestion_scrape_cycle_duration_seconds", "Full scrape cycle wall time"),
            &["scraper"],
        )?;
        let scrape_cycle_items = GaugeVec::new(
            Opts::new("ingestion_scrape_cycle_items", "Items processed in the last cycle"),
            &["scraper"],
        )?;

        let proxy_pool_working = Gauge::new("ingestion_proxy_pool_working", "Proxies currently eligible for rotation")?;
        let proxy_pool_tripped = Gauge::new("ingestion_proxy_pool_tripped", "Proxies with an open circuit")?;

        let categorization_total = CounterVec::new(
            Opts::new("ingestion_categorization_total", "Categorization attempts (C9)"),
            &["outcome"],
        )?;
        let categorization_cost_dollars =
            Counter::new("ingestion_categorization_cost_dollars_total", "Estimated classifier spend")?;

        let instagram_requests_total =
            Counter::new("ingestion_instagram_requests_total", "RapidAPI calls made by the Instagram scraper")?;
        let instagram_cost_dollars =
            Counter::new("ingestion_instagram_cost_dollars_total", "Accrued RapidAPI spend (§6 cost tracking)")?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(db_connections_active.clone()))?;
        registry.register(Box::new(db_connections_idle.clone()))?;
        registry.register(Box::new(db_query_duration.clone()))?;
        registry.register(Box::new(db_operations_total.clone()))?;
        registry.register(Box::new(fetch_total.clone()))?;
        registry.register(Box::new(fetch_duration.clone()))?;
        registry.register(Box::new(scrape_cycle_duration.clone()))?;
        registry.register(Box::new(scrape_cycle_items.clone()))?;
        registry.register(Box::new(proxy_pool_working.clone()))?;
        registry.register(Box::new(proxy_pool_tripped.clone()))?;
        registry.register(Box::new(categorization_total.clone()))?;
        registry.register(Box::new(categorization_cost_dollars.clone()))?;
        registry.register(Box::new(instagram_requests_total.clone()))?;
        registry.register(Box::new(instagram_cost_dollars.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            http_requests_total,
            http_request_duration,
            http_requests_in_flight,
            db_connections_active,
            db_connections_idle,
            db_query_duration,
            db_operations_total,
            fetch_total,
            fetch_duration,
            scrape_cycle_duration,
            scrape_cycle_items,
            proxy_pool_working,
            proxy_pool_tripped,
            categorization_total,
            categorization_cost_dollars,
            instagram_requests_total,
            instagram_cost_dollars,
            process_start: Instant::now(),
        })
    }

    pub fn record_http_request(&self, method: &Method, path: &str, status: StatusCode, duration: std::time::Duration) {
        let status_str = status.as_u16().to_string();
        self.http_requests_total.with_label_values(&[method.as_str(), path, &status_str]).inc();
        self.http_request_duration.with_label_values(&[method.as_str(), path]).observe(duration.as_secs_f64());
    }

    pub fn increment_in_flight_requests(&self) {
        self.http_requests_in_flight.inc();
    }

    pub fn decrement_in_flight_requests(&self) {
        self.http_requests_in_flight.dec();
    }

    pub fn update_db_connections(&self, active: u32, idle: u32) {
        self.db_connections_active.set(active as f64);
        self.db_connections_idle.set(idle as f64);
    }

    pub fn update_pool_metrics(&self, pool: &sqlx::PgPool) {
        let size = pool.size();
        let idle = pool.num_idle() as u32;
        self.update_db_connections(size.saturating_sub(idle), idle);
    }

    pub fn record_db_operation(&self, operation: &str, table: &str, duration: std::time::Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        self.db_operations_total.with_label_values(&[operation, table, status]).inc();
        self.db_query_duration.with_label_values(&[operation, table]).observe(duration.as_secs_f64());
    }

    pub fn record_fetch(&self, provider: &str, outcome: &str, duration: std::time::Duration) {
        self.fetch_total.with_label_values(&[provider, outcome]).inc();
        self.fetch_duration.with_label_values(&[provider]).observe(duration.as_secs_f64());
    }

    pub fn record_scrape_cycle(&self, scraper: &str, duration: std::time::Duration, items: u32) {
        self.scrape_cycle_duration.with_label_values(&[scraper]).observe(duration.as_secs_f64());
        self.scrape_cycle_items.with_label_values(&[scraper]).set(items as f64);
    }

    pub fn update_proxy_pool(&self, working: usize, tripped: usize) {
        self.proxy_pool_working.set(working as f64);
        self.proxy_pool_tripped.set(tripped as f64);
    }

    pub fn record_categorization(&self, outcome: &str, cost_dollars: f64) {
        self.categorization_total.with_label_values(&[outcome]).inc();
        self.categorization_cost_dollars.inc_by(cost_dollars);
    }

    /// §6 cost tracking: one RapidAPI call accrues `cost_per_request` dollars.
    pub fn record_instagram_request(&self, cost_per_request: f64) {
        self.instagram_requests_total.inc();
        self.instagram_cost_dollars.inc_by(cost_per_request);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.process_start.elapsed().as_secs()
    }

    /// Flattens the Prometheus registry into a JSON counters/gauges dict,
    /// the shape `GET /metrics` has always returned (§4.11).
    pub fn as_json(&self) -> Value {
        let mut system = serde_json::Map::new();
        for family in self.registry.gather() {
            let samples: Vec<Value> = family
                .get_metric()
                .iter()
                .map(|m| {
                    let labels: serde_json::Map<String, Value> = m
                        .get_label()
                        .iter()
                        .map(|l| (l.get_name().to_string(), json!(l.get_value())))
                        .collect();
                    let value = match family.get_field_type() {
                        MetricType::COUNTER => m.get_counter().get_value(),
                        MetricType::GAUGE => m.get_gauge().get_value(),
                        MetricType::HISTOGRAM => m.get_histogram().get_sample_sum(),
                        _ => 0.0,
                    };
                    json!({ "labels": labels, "value": value })
                })
                .collect();
            system.insert(family.get_name().to_string(), Value::Array(samples));
        }

        json!({
            "system": system,
            "application": {
                "uptime_seconds": self.uptime_seconds(),
            },
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

/// Records its own duration+status when `finish` is called.
pub struct RequestTimer {
    metrics: Arc<MetricsCollector>,
    method: Method,
    path: String,
    start: Instant,
}

impl RequestTimer {
    pub fn new(metrics: Arc<MetricsCollector>, method: Method, path: String) -> Self {
        metrics.increment_in_flight_requests();
        Self { metrics, method, path, start: Instant::now() }
    }

    pub fn finish(self, status: StatusCode) {
        self.metrics.decrement_in_flight_requests();
        self.metrics.record_http_request(&self.method, &self.path, status, self.start.elapsed());
    }
}

pub async fn metrics_handler(State(metrics): State<Arc<MetricsCollector>>) -> impl IntoResponse {
    (StatusCode::OK, Json(metrics.as_json())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_registers_without_panicking() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_http_request(&Method::GET, "/health", StatusCode::OK, std::time::Duration::from_millis(5));
        collector.update_proxy_pool(3, 1);
        let json = collector.as_json();
        assert!(json["system"].get("ingestion_http_requests_total").is_some());
        assert!(json["system"].get("ingestion_proxy_pool_working").is_some());
    }

    #[test]
    fn record_fetch_increments_outcome_counter() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_fetch("reddit", "success", std::time::Duration::from_millis(120));
        let json = collector.as_json();
        assert!(json["system"].get("ingestion_fetch_total").is_some());
    }

    #[test]
    fn record_instagram_request_accrues_cost() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_instagram_request(0.001);
        collector.record_instagram_request(0.001);
        let json = collector.as_json();
        let family = json["system"]["ingestion_instagram_cost_dollars_total"].as_array().unwrap();
        assert_eq!(family[0]["value"].as_f64().unwrap(), 0.002);
    }
}
