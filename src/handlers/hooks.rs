//! Agent lifecycle hooks
//!
//! Hosts call these around model resolution and agent runs. Every hook
//! routes the prompt (recording a `routed` event); whether the decision is
//! applied depends on `[hard_apply]`:
//!
//! - `override`: `before_model_resolve` and `before_agent_start` answer with
//!   `providerOverride`/`modelOverride`
//! - `pin`: `before_agent_start` writes the decision into the host catalog
//!   (per `pin_scope`) and the agent's main session, and remembers it per
//!   session; `agent_end` re-applies the session pin and hands it back once
//!
//! With `routing.enabled = false` every hook answers `{}`. Routing and host
//! file edits run on the blocking pool; a failure there is logged and the
//! hook answers `{}`.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HardApplyMode;
use crate::handlers::AppState;
use crate::models::PendingPin;
use crate::shared::AutoRoute;

#[derive(Debug, Default, Deserialize)]
pub struct ModelResolveEvent {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentStartEvent {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
    #[serde(default, alias = "agentId")]
    pub agent_id: Option<String>,
    #[serde(default, alias = "sessionKey")]
    pub session_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentEndEvent {
    #[serde(default, alias = "sessionKey")]
    pub session_key: Option<String>,
}

/// Hook answer; empty fields are omitted so "no change" is `{}`
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<PendingPin>,
}

impl HookResponse {
    fn none() -> Self {
        Self::default()
    }

    fn overriding(routed: &AutoRoute) -> Self {
        Self {
            provider_override: Some(routed.provider_override.clone()),
            model_override: Some(routed.model_override.clone()),
            pin: None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Route a hook prompt off the async runtime
async fn auto_route(
    state: &AppState,
    prompt: String,
    messages: Option<Vec<Value>>,
    hook: &'static str,
) -> Option<AutoRoute> {
    let routed = state
        .run_blocking(move |state| state.workflow().auto_route(&prompt, messages.as_deref()))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, hook, "Auto-route skipped");
            None
        })?;
    tracing::info!(model_ref = %routed.model_ref(), hook, "Auto-routed prompt");
    Some(routed)
}

pub async fn before_model_resolve(
    State(state): State<AppState>,
    Json(event): Json<ModelResolveEvent>,
) -> Json<HookResponse> {
    if !state.config().routing.enabled {
        return Json(HookResponse::none());
    }

    let Some(routed) = auto_route(&state, event.prompt, event.messages, "model_resolve").await
    else {
        return Json(HookResponse::none());
    };

    if state.config().hard_apply.is_active(HardApplyMode::Override) {
        return Json(HookResponse::overriding(&routed));
    }
    Json(HookResponse::none())
}

pub async fn before_agent_start(
    State(state): State<AppState>,
    Json(event): Json<AgentStartEvent>,
) -> Json<HookResponse> {
    if !state.config().routing.enabled {
        return Json(HookResponse::none());
    }

    let agent_id = non_empty(event.agent_id.as_deref()).map(str::to_string);
    let session_key = non_empty(event.session_key.as_deref()).map(str::to_string);
    let Some(routed) = auto_route(&state, event.prompt, event.messages, "agent_start").await
    else {
        return Json(HookResponse::none());
    };

    let hard_apply = &state.config().hard_apply;
    if hard_apply.is_active(HardApplyMode::Pin) {
        let scope = hard_apply.pin_scope;
        let provider_id = routed.provider_override.clone();
        let model_id = routed.model_override.clone();
        let agent = agent_id.clone();
        let applied = state
            .run_blocking(move |state| {
                state
                    .host()
                    .apply_pin(scope, agent.as_deref(), &provider_id, &model_id)
            })
            .await;
        if let Err(e) = applied {
            tracing::warn!(error = %e, "Pin not applied");
        }

        if let (Some(agent_id), Some(session_key)) = (agent_id, session_key) {
            state
                .pins()
                .remember(
                    &session_key,
                    PendingPin {
                        agent_id,
                        provider_id: routed.provider_override,
                        model_id: routed.model_override,
                    },
                )
                .await;
        }
        return Json(HookResponse::none());
    }

    if hard_apply.is_active(HardApplyMode::Override) {
        return Json(HookResponse::overriding(&routed));
    }
    Json(HookResponse::none())
}

pub async fn agent_end(
    State(state): State<AppState>,
    Json(event): Json<AgentEndEvent>,
) -> Json<HookResponse> {
    if !state.config().routing.enabled || !state.config().hard_apply.is_active(HardApplyMode::Pin)
    {
        return Json(HookResponse::none());
    }
    let Some(session_key) = non_empty(event.session_key.as_deref()) else {
        return Json(HookResponse::none());
    };
    let Some(pin) = state.pins().take(session_key).await else {
        return Json(HookResponse::none());
    };

    let pending = pin.clone();
    let applied = state
        .run_blocking(move |state| state.host().set_session_model(&pending))
        .await;
    match applied {
        Ok(Ok(changed)) => tracing::info!(
            model_ref = %pin.model_ref(),
            session_key = %session_key,
            session_changed = changed,
            "Confirmed session pin"
        ),
        Ok(Err(e)) | Err(e) => tracing::warn!(
            error = %e,
            model_ref = %pin.model_ref(),
            session_key = %session_key,
            "Session pin not applied"
        ),
    }

    Json(HookResponse {
        pin: Some(pin),
        ..HookResponse::default()
    })
}
