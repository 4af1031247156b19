//! POST /api/categorization/start (§4.11): kicks off a C9 batch in the
//! background and hands back a job id immediately; progress is observable
//! through the structured logs (C4), not a job-status endpoint spec.md
//! doesn't define.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::Result;
use crate::models::log_entry::LogLevel;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartCategorizationRequest {
    pub batch_size: u32,
    pub limit: Option<u32>,
    pub ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct StartCategorizationResponse {
    pub job_id: String,
}

pub async fn start_categorization(
    State(state): State<AppState>,
    Json(req): Json<StartCategorizationRequest>,
) -> Result<Json<StartCategorizationResponse>> {
    let job_id = Uuid::new_v4().to_string();

    if let Some(categorizer) = state.categorizer.clone() {
        let logger = state.logger.clone();
        let job_id_for_task = job_id.clone();
        tokio::spawn(async move {
            match categorizer.run_batch(req.batch_size, req.limit, req.ids).await {
                Ok(summary) => {
                    info!(job_id = %job_id_for_task, ?summary, "categorization: batch completed");
                    logger
                        .log(
                            LogLevel::Success,
                            format!(
                                "Categorization job {} completed: {} processed, {} applied, {} skipped, {} rejected",
                                job_id_for_task, summary.processed, summary.applied, summary.skipped, summary.rejected
                            ),
                        )
                        .await;
                }
                Err(e) => {
                    error!(job_id = %job_id_for_task, error = %e, "categorization: batch failed");
                    logger
                        .log(LogLevel::Error, format!("Categorization job {} failed: {}", job_id_for_task, e))
                        .await;
                }
            }
        });
    } else {
        info!(job_id = %job_id, "categorization: no classifier configured, job accepted as a no-op");
    }

    Ok(Json(StartCategorizationResponse { job_id }))
}
