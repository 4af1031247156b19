//! Request latency middleware (§6: every response carries `X-Process-Time`
//! and `X-Server`) doubling as the HTTP-surface feed into `MetricsCollector`.

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::MetricsCollector;

const SERVER_NAME: &str = "b9-ingestion-core";

pub async fn latency_middleware(
    State(metrics): State<Arc<MetricsCollector>>,
    matched_path: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let path = matched_path
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let mut response = next.run(request).await;

    let duration = start.elapsed();
    metrics.record_http_request(&method, &path, response.status(), duration);

    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&format!("{:.3}", duration.as_secs_f64() * 1000.0)) {
        headers.insert("x-process-time", v);
    }
    headers.insert("x-server", HeaderValue::from_static(SERVER_NAME));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn test_handler() -> &'static str {
        "OK"
    }

    async fn slow_handler() -> &'static str {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        "SLOW OK"
    }

    #[tokio::test]
    async fn adds_process_time_and_server_headers() {
        let metrics = Arc::new(MetricsCollector::new().expect("Failed to create metrics"));

        let app = Router::new()
            .route("/test", get(test_handler))
            .layer(middleware::from_fn_with_state(metrics.clone(), latency_middleware))
            .with_state(metrics.clone());

        let response = app
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-process-time"));
        assert_eq!(response.headers().get("x-server").unwrap(), "b9-ingestion-core");
    }

    #[tokio::test]
    async fn records_duration_into_metrics_collector() {
        let metrics = Arc::new(MetricsCollector::new().expect("Failed to create metrics"));

        let app = Router::new()
            .route("/slow", get(slow_handler))
            .layer(middleware::from_fn_with_state(metrics.clone(), latency_middleware))
            .with_state(metrics.clone());

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = metrics.as_json();
        assert!(json["system"].get("ingestion_http_request_duration_seconds").is_some());
    }
}
