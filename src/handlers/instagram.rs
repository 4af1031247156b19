//! POST /api/instagram/creator (§4.11): manual creator add.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddCreatorRequest {
    pub username: String,
    pub ig_user_id: String,
    pub niche: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddCreatorResponse {
    pub accepted: bool,
    pub ig_user_id: String,
}

pub async fn add_creator(
    State(state): State<AppState>,
    Json(req): Json<AddCreatorRequest>,
) -> Result<(StatusCode, Json<AddCreatorResponse>)> {
    if req.username.trim().is_empty() || req.ig_user_id.trim().is_empty() {
        return Err(CoreError::Validation {
            field: "username/ig_user_id".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let inserted: Option<(String,)> = sqlx::query_as(
        "INSERT INTO instagram_creators \
         (ig_user_id, username, enabled, followers_count, following_count, media_count, \
          niche, review_status, avg_views_per_reel, avg_engagement_per_post, engagement_rate) \
         VALUES ($1, $2, true, 0, 0, 0, $3, 'unset', 0, 0, 0) \
         ON CONFLICT (ig_user_id) DO NOTHING RETURNING ig_user_id",
    )
    .bind(&req.ig_user_id)
    .bind(&req.username)
    .bind(&req.niche)
    .fetch_optional(&state.db_pool)
    .await
    .map_err(CoreError::from)?;

    match inserted {
        Some((ig_user_id,)) => Ok((StatusCode::CREATED, Json(AddCreatorResponse { accepted: true, ig_user_id }))),
        None => Err(CoreError::Conflict { resource: format!("instagram creator {}", req.ig_user_id) }),
    }
}
