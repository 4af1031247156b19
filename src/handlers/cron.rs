//! POST /api/cron/cleanup-logs (§4.11, §4.10): bearer-token-gated trigger for C10.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::services::log_cleanup::{verify_cron_secret, CleanupSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CleanupLogsRequest {
    pub retention_days: i64,
}

#[derive(Debug, Serialize)]
pub struct CleanupLogsResponse {
    pub summary: CleanupSummary,
}

pub async fn cleanup_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CleanupLogsRequest>,
) -> Result<(StatusCode, Json<CleanupLogsResponse>)> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    if !verify_cron_secret(token, &state.config.cron.secret) {
        return Err(CoreError::Unauthorized);
    }

    let summary = state.log_cleanup.run(req.retention_days).await?;
    Ok((StatusCode::OK, Json(CleanupLogsResponse { summary })))
}
