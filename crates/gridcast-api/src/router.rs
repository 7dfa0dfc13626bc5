//! Route table for the Gridcast API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/context-pack", post(handlers::context_pack))
        .route("/predictions", post(handlers::submit_prediction))
        .route(
            "/predictions/generate",
            post(handlers::generate_predictions),
        )
        .route("/council/consensus", post(handlers::council_consensus))
        .route("/outcomes", post(handlers::submit_outcomes))
        .route("/shadow/predictions", post(handlers::shadow_predictions))
        .route(
            "/shadow/predictions/{shadow_run_id}",
            get(handlers::shadow_rows),
        )
        .route(
            "/shadow/telemetry/{shadow_run_id}",
            get(handlers::shadow_telemetry),
        )
        .route("/shadow/health", get(handlers::shadow_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
