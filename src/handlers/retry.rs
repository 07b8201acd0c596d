//! Retry advice endpoint

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::shared::{RetryAdvice, format_retry_advice};

/// Body of `POST /retry`
#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub advice: RetryAdvice,
    pub text: String,
}

/// Classify a provider error and cool down the model that produced it
///
/// # Errors
/// Returns 400 when `error` is blank.
pub async fn handler(
    State(state): State<AppState>,
    Json(request): Json<RetryRequest>,
) -> AppResult<Json<RetryResponse>> {
    let error_text = request.error.trim();
    if error_text.is_empty() {
        return Err(AppError::Validation(
            "error must describe the provider failure".to_string(),
        ));
    }

    let error_text = error_text.to_string();
    let advice = state
        .run_blocking(move |state| state.workflow().advise_retry(&error_text))
        .await?;
    let text = format_retry_advice(&advice);
    Ok(Json(RetryResponse { advice, text }))
}
