//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Geofence CRUD and on-demand intrusion detection
//! - Range-aware video serving
//! - Alert and monitor diagnostics
//! - Request validation and response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let detector_ok = state.detector.health_check().await;

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        detector_connected: detector_ok,
        geofence_backend: state.geofences.backend().to_string(),
        monitors: state.supervisor.unit_count().await,
        monitors_running: state.supervisor.running_count().await,
    };

    Json(response)
}
