//! Distribution plan and record handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use ecochain_distribution::PlanOutcome;
use ecochain_types::{DistributionPlan, DistributionRecord, PlanId};

/// List all plans
pub async fn list_plans(State(state): State<AppState>) -> Json<Vec<DistributionPlan>> {
    Json(state.pipeline.plans())
}

/// Get a specific plan
pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<DistributionPlan>> {
    let plan = state
        .pipeline
        .plan(&PlanId::new(&plan_id))
        .ok_or_else(|| ApiError::NotFound(format!("Plan {} not found", plan_id)))?;

    Ok(Json(plan))
}

/// Records of one plan plus its completion flag
pub async fn get_plan_records(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<PlanOutcome>> {
    let plan_id = PlanId::new(plan_id);
    if state.pipeline.plan(&plan_id).is_none() {
        return Err(ApiError::NotFound(format!("Plan {} not found", plan_id)));
    }
    let outcome = state.pipeline.plan_outcome(&plan_id).await?;
    Ok(Json(outcome))
}

/// All distribution records
pub async fn list_records(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DistributionRecord>>> {
    Ok(Json(state.pipeline.records().await?))
}
