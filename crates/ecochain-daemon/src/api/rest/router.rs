//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Scores
        .route("/scores", get(handlers::list_scores))
        .route("/scores/:operation_id", get(handlers::get_operation_scores))
        // Attestations
        .route("/attestations", get(handlers::list_attestations))
        .route("/attestations/summary", get(handlers::attestation_summary))
        // Epochs
        .route("/epochs", get(handlers::list_epochs))
        .route("/epochs/:epoch", get(handlers::get_epoch))
        // Distributions
        .route("/plans", get(handlers::list_plans))
        .route("/plans/:plan_id", get(handlers::get_plan))
        .route("/plans/:plan_id/records", get(handlers::get_plan_records))
        .route("/records", get(handlers::list_records));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
