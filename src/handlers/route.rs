//! Route endpoint
//!
//! Scores the catalog against one request and records a `routed` usage event
//! for the winner.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppResult;
use crate::handlers::AppState;
use crate::normalizer::parse_command_input;
use crate::router::{RouteDecision, format_decision};

/// Body of `POST /route`
///
/// `input` may be any request shape the normalizer accepts. A string is
/// treated like command-line input: JSON when it parses, otherwise one user
/// message.
#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub decision: RouteDecision,
    pub text: String,
}

pub async fn handler(
    State(state): State<AppState>,
    Json(request): Json<RouteRequest>,
) -> AppResult<Json<RouteResponse>> {
    let payload = match request.input {
        Value::String(raw) => parse_command_input(&raw),
        other => other,
    };

    let decision = state
        .run_blocking(move |state| state.workflow().route_and_record(&payload))
        .await?;
    let text = format_decision(&decision);
    Ok(Json(RouteResponse { decision, text }))
}
