//! Attestation handlers

use super::EpochQuery;
use crate::api::rest::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use ecochain_attest::AttestationSummary;
use ecochain_types::Attestation;

/// List settled attestations, optionally for one epoch
pub async fn list_attestations(
    State(state): State<AppState>,
    Query(query): Query<EpochQuery>,
) -> Json<Vec<Attestation>> {
    Json(state.pipeline.attestations(query.epoch()))
}

/// Verified/rejected counts, optionally for one epoch
pub async fn attestation_summary(
    State(state): State<AppState>,
    Query(query): Query<EpochQuery>,
) -> Json<AttestationSummary> {
    Json(state.pipeline.attestation_summary(query.epoch()))
}
