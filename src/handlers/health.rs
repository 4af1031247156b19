//! GET /health, /ready, /alive (§4.11).

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DepStatus {
    pub name: &'static str,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub deps: Vec<DepStatus>,
}

/// Composite check: database is a hard dependency (503 when down); the proxy
/// pool is reported but doesn't flip the overall status, since an empty pool
/// is a recoverable operating condition the supervisor already handles (§5).
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_healthy = sqlx::query("SELECT 1").execute(&state.db_pool).await.is_ok();
    let proxies_working = state.proxy_pool.working_count().await;

    let deps = vec![
        DepStatus { name: "database", healthy: db_healthy },
        DepStatus { name: "proxy_pool", healthy: proxies_working > 0 },
    ];

    let status = if db_healthy { "healthy" } else { "unhealthy" };
    let code = if db_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(HealthResponse { status, deps }))
}

pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}
