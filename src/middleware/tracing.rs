//! Correlation-ID tracing middleware. Every request gets (or keeps) an
//! `x-correlation-id` header and a tracing span tagged with it; the
//! structured business logging (C4) is a separate concern handled by
//! `services::logger`, not this middleware.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::info;
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    pub fn from_string(s: String) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn tracing_middleware(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    let correlation_id = extract_or_generate_correlation_id(request.headers());
    request.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id.as_str(),
        method = %request.method(),
        uri = %request.uri(),
    );
    let _enter = span.enter();

    let method = request.method().to_string();
    let uri = request.uri().to_string();

    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    info!(correlation_id = %correlation_id.as_str(), method, uri, status, duration_ms, "http request completed");

    let mut response = response;
    if let Ok(header_value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(HeaderName::from_static(CORRELATION_ID_HEADER), header_value);
    }
    response
}

fn extract_or_generate_correlation_id(headers: &axum::http::HeaderMap) -> CorrelationId {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| CorrelationId::from_string(s.to_string()))
        .unwrap_or_else(CorrelationId::new)
}

pub fn get_correlation_id_from_request(request: &Request) -> Option<CorrelationId> {
    request.extensions().get::<CorrelationId>().cloned()
}

pub fn create_child_correlation_id(parent: &CorrelationId, operation: &str) -> CorrelationId {
    CorrelationId::from_string(format!("{}.{}.{}", parent.as_str(), operation, Uuid::new_v4()))
}

/// Times an operation and emits a single structured completion log line.
pub struct OperationTimer {
    correlation_id: CorrelationId,
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(correlation_id: CorrelationId, operation: String) -> Self {
        Self { correlation_id, operation, start: Instant::now() }
    }

    pub fn finish(self, success: bool, message: &str) {
        let duration_ms = self.start.elapsed().as_millis();
        if success {
            info!(correlation_id = %self.correlation_id.as_str(), operation = %self.operation, duration_ms, "{}", message);
        } else {
            tracing::warn!(correlation_id = %self.correlation_id.as_str(), operation = %self.operation, duration_ms, "{}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_roundtrips_through_headers() {
        let id = CorrelationId::new();
        let value = HeaderValue::from_str(id.as_str()).unwrap();
        assert_eq!(value.to_str().unwrap(), id.as_str());
    }

    #[test]
    fn child_correlation_id_embeds_parent_and_operation() {
        let parent = CorrelationId::from_string("abc".to_string());
        let child = create_child_correlation_id(&parent, "fetch");
        assert!(child.as_str().starts_with("abc.fetch."));
    }
}
