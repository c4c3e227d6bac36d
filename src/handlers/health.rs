//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// "configured" when a default remote key is set, otherwise "stub_only"
    pub remote_backend: &'static str,
    /// "operational" or "degraded"
    pub metrics_status: &'static str,
}

/// Health check handler
///
/// Always 200 OK; the service answers every request even without a
/// remote backend. Metrics status is "degraded" once any metrics recording
/// has failed.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let remote_backend = if state.config().openai.api_key.is_some() {
        "configured"
    } else {
        "stub_only"
    };
    let metrics_status = if state.metrics().metrics_recording_failures_count() > 0 {
        "degraded"
    } else {
        "operational"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            remote_backend,
            metrics_status,
        }),
    )
}
