//! Health check endpoint
//!
//! Provides a simple health check for monitoring and hook hosts.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Whether hook routing is enabled (`routing.enabled`)
    pub enabled: bool,
}

/// Health check handler
///
/// Always 200 OK. A disabled router is still healthy: route and retry keep
/// working for diagnostics, only hook overrides are switched off.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            enabled: state.config().routing.enabled,
        }),
    )
}
