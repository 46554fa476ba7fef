//! Score handlers

use super::EpochQuery;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use ecochain_scoring::advise;
use ecochain_types::{OperationId, ScoreResult};
use serde::Serialize;

/// List scores, optionally for one epoch
pub async fn list_scores(
    State(state): State<AppState>,
    Query(query): Query<EpochQuery>,
) -> Json<Vec<ScoreResult>> {
    Json(state.pipeline.scores(query.epoch()))
}

/// Score history of one operation
#[derive(Debug, Serialize)]
pub struct ScoreHistoryResponse {
    pub operation_id: OperationId,
    pub scores: Vec<ScoreResult>,
    /// Suggestions for the most recent score
    pub advice: Vec<String>,
}

pub async fn get_operation_scores(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> ApiResult<Json<ScoreHistoryResponse>> {
    let operation_id = OperationId::new(operation_id);
    let scores = state.pipeline.score_history(&operation_id);
    let latest = scores
        .last()
        .ok_or_else(|| ApiError::NotFound(format!("No scores for operation {}", operation_id)))?;
    let advice = advise(latest)
        .iter()
        .map(|a| a.message().to_string())
        .collect();

    Ok(Json(ScoreHistoryResponse {
        operation_id,
        scores,
        advice,
    }))
}
