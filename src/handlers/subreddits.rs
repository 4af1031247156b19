//! POST /api/subreddits/fetch-single (§4.11).

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::models::subreddit::normalize_subreddit_name;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FetchSingleRequest {
    pub subreddit_name: String,
}

pub async fn fetch_single(
    State(state): State<AppState>,
    Json(req): Json<FetchSingleRequest>,
) -> Result<Json<serde_json::Value>> {
    let name = normalize_subreddit_name(&req.subreddit_name)
        .map_err(|message| CoreError::Validation { field: "subreddit_name".to_string(), message })?;

    let fields = state.subreddit_scraper.fetch_single(&name).await?;
    Ok(Json(serde_json::to_value(fields).map_err(CoreError::from)?))
}
