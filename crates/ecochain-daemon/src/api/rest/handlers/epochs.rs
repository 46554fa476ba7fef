//! Epoch report handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::pipeline::EpochReport;
use axum::{
    extract::{Path, State},
    Json,
};
use ecochain_types::Epoch;

/// Reports of every closed epoch
pub async fn list_epochs(State(state): State<AppState>) -> Json<Vec<EpochReport>> {
    Json(state.pipeline.epoch_reports())
}

/// Report of one closed epoch, including unattested and unscored operations
pub async fn get_epoch(
    State(state): State<AppState>,
    Path(epoch): Path<u64>,
) -> ApiResult<Json<EpochReport>> {
    let report = state
        .pipeline
        .epoch_report(Epoch(epoch))
        .ok_or_else(|| ApiError::NotFound(format!("Epoch {} not closed", epoch)))?;

    Ok(Json(report))
}
