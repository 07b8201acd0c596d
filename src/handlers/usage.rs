//! Usage and quota endpoints
//!
//! Read-only summaries of the persisted state plus the quota management call.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::models::ModelKey;
use crate::state::{QuotaEntry, UsageEvent, summarize_quota, summarize_usage};

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub usage: Vec<UsageEvent>,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct QuotaResponse {
    pub quota: BTreeMap<ModelKey, QuotaEntry>,
    pub text: String,
}

/// Body of `PUT /quota`
///
/// `remaining` accepts a JSON number or a numeric string.
#[derive(Debug, Deserialize)]
pub struct SetQuotaRequest {
    #[serde(alias = "modelKey")]
    pub model_key: String,
    pub remaining: Value,
    #[serde(default, alias = "resetAt")]
    pub reset_at: Option<String>,
}

pub async fn usage_handler(State(state): State<AppState>) -> AppResult<Json<UsageResponse>> {
    let snapshot = state
        .run_blocking(|state| state.workflow().ledger().state())
        .await?;
    let text = summarize_usage(&snapshot);
    Ok(Json(UsageResponse {
        usage: snapshot.usage,
        text,
    }))
}

pub async fn quota_handler(State(state): State<AppState>) -> AppResult<Json<QuotaResponse>> {
    let snapshot = state
        .run_blocking(|state| state.workflow().ledger().state())
        .await?;
    let text = summarize_quota(&snapshot);
    Ok(Json(QuotaResponse {
        quota: snapshot.quota,
        text,
    }))
}

/// Overwrite the quota entry for one model
///
/// # Errors
/// 400 for a malformed key, remaining value or reset time; 500 when the
/// state cannot be written.
pub async fn set_quota_handler(
    State(state): State<AppState>,
    Json(request): Json<SetQuotaRequest>,
) -> AppResult<Json<QuotaResponse>> {
    let remaining_raw = match &request.remaining {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(AppError::Validation(format!(
                "Invalid remaining value: {other}"
            )));
        }
    };

    let model_key = request.model_key.trim().to_string();
    let key = model_key.clone();
    let reset_at = request.reset_at;
    let snapshot = state
        .run_blocking(move |state| {
            state
                .workflow()
                .set_quota_from_args(&key, &remaining_raw, reset_at.as_deref())
        })
        .await??;

    tracing::info!(model_key = %model_key, "Quota updated");
    Ok(Json(QuotaResponse {
        text: format!("Quota updated for {model_key}"),
        quota: snapshot.quota,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_state;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;

    fn request(body: Value) -> SetQuotaRequest {
        serde_json::from_value(body).expect("request body should deserialize")
    }

    #[tokio::test]
    async fn test_usage_handler_empty_state() {
        let Json(body) = usage_handler(State(test_state())).await.unwrap();
        assert!(body.usage.is_empty());
        assert!(body.text.starts_with("KeyRouter Usage Summary"));
    }

    #[tokio::test]
    async fn test_set_quota_accepts_number_and_string() {
        let state = test_state();

        let Json(body) = set_quota_handler(
            State(state.clone()),
            Json(request(json!({"model_key": "openai/o3", "remaining": 12.5}))),
        )
        .await
        .unwrap();
        assert_eq!(body.text, "Quota updated for openai/o3");
        assert_eq!(body.quota[&ModelKey::from("openai/o3")].remaining, Some(12.5));

        let Json(body) = set_quota_handler(
            State(state.clone()),
            Json(request(json!({
                "modelKey": "anthropic/claude-3-haiku",
                "remaining": "40",
                "resetAt": "2026-01-01T00:00:00Z"
            }))),
        )
        .await
        .unwrap();
        let entry = &body.quota[&ModelKey::from("anthropic/claude-3-haiku")];
        assert_eq!(entry.remaining, Some(40.0));
        assert!(entry.reset_at.is_some());

        let Json(quota) = quota_handler(State(state)).await.unwrap();
        assert_eq!(quota.quota.len(), 2);
    }

    #[tokio::test]
    async fn test_set_quota_rejects_non_numeric_remaining() {
        for remaining in [json!("abc"), json!(true), json!(null)] {
            let result = set_quota_handler(
                State(test_state()),
                Json(request(json!({"model_key": "openai/o3", "remaining": remaining}))),
            )
            .await;
            let response = result.unwrap_err().into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_set_quota_rejects_bad_reset_time() {
        let result = set_quota_handler(
            State(test_state()),
            Json(request(json!({
                "model_key": "openai/o3",
                "remaining": 1,
                "reset_at": "tomorrow"
            }))),
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: Invalid reset time: tomorrow");
    }
}
