//! Assembles the read-only introspection + process-control router (§6),
//! mirroring the teacher's `routes::create_api_router` nesting.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/devices", get(handlers::list_devices))
        .route("/devices/{id}", get(handlers::get_device))
        .route("/devices/{id}/points", get(handlers::get_device_points))
        .route("/devices/{id}/stats", get(handlers::get_device_stats))
        .route("/devices/{id}/pause", post(handlers::pause_device))
        .route("/devices/{id}/resume", post(handlers::resume_device))
        .route("/devices/{id}/reload", post(handlers::reload_device))
        .with_state(state)
}
