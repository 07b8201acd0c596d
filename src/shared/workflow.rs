//! Routing workflows shared by the CLI and the HTTP server
//!
//! Each workflow runs the pure routing core and then feeds the outcome back
//! into the usage ledger. Ledger writes are best effort: a failed write is
//! logged and counted, and the routing result is still returned.
//!
//! A workflow built from configuration re-reads the provider catalog on every
//! call, so host edits apply without a restart. If the file stops parsing,
//! the last catalog that did is kept.

use crate::catalog::{ProviderCatalog, ProviderPolicy, format_snapshot, ingest_snapshot};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::models::{ExclusionSet, ModelKey};
use crate::retry::{RetryRecommendation, classify_error, next_candidate, retry_recommendation};
use crate::router::{KeyRouter, RouteCandidate, RouteDecision, RouteOptions};
use crate::state::{
    FileStateStore, KeyRouterState, QuotaEntry, UsageEvent, UsageLedger, UsageStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Request routed after a failure to find an alternate candidate
const FALLBACK_REQUEST: &str = "fallback request";

/// Prompts with this prefix are KeyRouter's own commands and never routed
const COMMAND_PREFIX: &str = "/keyrouter_";

/// Routing settings taken from the configuration file
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub provider_policy: ProviderPolicy,
    pub max_attempts: u32,
    pub honor_cooldowns: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            provider_policy: ProviderPolicy::default(),
            max_attempts: crate::retry::DEFAULT_MAX_ATTEMPTS,
            honor_cooldowns: false,
        }
    }
}

impl From<&Config> for WorkflowSettings {
    fn from(config: &Config) -> Self {
        Self {
            provider_policy: config.providers.clone(),
            max_attempts: config.routing.max_attempts,
            honor_cooldowns: config.routing.honor_cooldowns,
        }
    }
}

/// Result of [`Workflow::advise_retry`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAdvice {
    pub recommendation: RetryRecommendation,
    /// Top candidate of the fallback route, which received the cooldown
    pub failed_candidate: Option<ModelKey>,
    /// Second-ranked candidate of the fallback route
    pub alternate_candidate: Option<RouteCandidate>,
}

/// Result of [`Workflow::auto_route`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRoute {
    pub provider_override: String,
    pub model_override: String,
    pub decision: RouteDecision,
}

impl AutoRoute {
    pub fn model_ref(&self) -> String {
        format!("{}/{}", self.provider_override, self.model_override)
    }
}

/// Router, ledger and metrics wired together
#[derive(Clone)]
pub struct Workflow {
    router: Arc<RwLock<KeyRouter>>,
    catalog_path: Option<PathBuf>,
    ledger: UsageLedger,
    metrics: Arc<Metrics>,
    settings: WorkflowSettings,
}

impl Workflow {
    pub fn new(
        router: KeyRouter,
        ledger: UsageLedger,
        metrics: Arc<Metrics>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            router: Arc::new(RwLock::new(router)),
            catalog_path: None,
            ledger,
            metrics,
            settings,
        }
    }

    /// Re-read the provider catalog from `path` before every routing call
    pub fn reloading_catalog_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    /// Wire the production stack: catalog and state file from `config.paths`
    ///
    /// # Errors
    /// Returns an error if the provider catalog exists but cannot be read or
    /// parsed, or if metrics registration fails.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let catalog = ProviderCatalog::from_file(config.paths.catalog_path())?;
        let store = Arc::new(FileStateStore::new(config.paths.state_path()));
        let metrics = Metrics::new()
            .map_err(|e| AppError::Internal(format!("Failed to register metrics: {e}")))?;

        Ok(Self::new(
            KeyRouter::new(catalog),
            UsageLedger::new(store),
            Arc::new(metrics),
            WorkflowSettings::from(config),
        )
        .reloading_catalog_from(config.paths.catalog_path()))
    }

    /// Router over the current catalog
    pub fn router(&self) -> KeyRouter {
        let Some(path) = &self.catalog_path else {
            return self.cached_router();
        };

        match ProviderCatalog::from_file(path) {
            Ok(catalog) => {
                let mut router = self.router.write().unwrap_or_else(PoisonError::into_inner);
                *router = router.with_catalog(catalog);
                router.clone()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Provider catalog reload failed, keeping previous catalog");
                self.cached_router()
            }
        }
    }

    fn cached_router(&self) -> KeyRouter {
        self.router
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Options for one routing call, including cooldown exclusions when enabled
    pub fn route_options(&self) -> RouteOptions {
        let excluded = if self.settings.honor_cooldowns {
            self.ledger.active_cooldowns()
        } else {
            ExclusionSet::new()
        };
        RouteOptions::new()
            .with_provider_policy(self.settings.provider_policy.clone())
            .with_excluded(excluded)
    }

    fn route(&self, payload: &Value, options: &RouteOptions) -> RouteDecision {
        let start = Instant::now();
        let decision = self.router().route_payload(payload, options);
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = self
            .metrics
            .record_route(decision.policy, decision.top_candidates.len())
        {
            tracing::warn!(error = %e, "Failed to record route metric");
        }
        if let Err(e) = self
            .metrics
            .record_routing_duration(decision.policy, duration_ms)
        {
            tracing::warn!(error = %e, duration_ms, "Failed to record routing duration");
        }
        decision
    }

    fn record(&self, event: UsageEvent) {
        let status = event.status;
        match self.ledger.record_usage(event) {
            Ok(_) => {
                if let Err(e) = self.metrics.record_usage_event(status) {
                    tracing::warn!(error = %e, "Failed to record usage metric");
                }
            }
            Err(e) => {
                self.metrics.state_write_failure();
                tracing::warn!(
                    error = %e,
                    status = status.as_str(),
                    "Usage event not persisted, continuing"
                );
            }
        }
    }

    /// Provider catalog audit report
    pub fn audit_report(&self) -> String {
        format_snapshot(&ingest_snapshot(self.router().catalog()))
    }

    /// Route a raw payload and record a `routed` event for the top candidate
    pub fn route_and_record(&self, payload: &Value) -> RouteDecision {
        let decision = self.route(payload, &self.route_options());

        match decision.top() {
            Some(top) => {
                tracing::info!(
                    policy = %decision.policy,
                    model_key = %top.model_key(),
                    score = top.score,
                    "Routed request"
                );
                self.record(UsageEvent::new(
                    &top.provider_id,
                    &top.model_id,
                    UsageStatus::Routed,
                ));
            }
            None => {
                tracing::info!(policy = %decision.policy, "No candidate matched request");
            }
        }
        decision
    }

    /// Classify an error, recommend a reaction and cool down the failed model
    ///
    /// The failed model is taken to be the current top pick for a fixed fallback
    /// request; its runner-up is offered as the alternate.
    pub fn advise_retry(&self, error_text: &str) -> RetryAdvice {
        let error_class = classify_error(error_text);
        if let Err(e) = self.metrics.record_retry_classification(error_class) {
            tracing::warn!(error = %e, "Failed to record retry classification metric");
        }
        let recommendation = retry_recommendation(error_class, 1, self.settings.max_attempts, true);

        let fallback = json!([{ "role": "user", "content": FALLBACK_REQUEST }]);
        let decision = self.route(&fallback, &self.route_options());
        let alternate_candidate = next_candidate(&decision.top_candidates, 0).cloned();

        let failed_candidate = decision.top().map(|top| {
            let key = top.model_key();
            if let Err(e) = self.ledger.mark_failure_with_error(&key, error_class) {
                self.metrics.state_write_failure();
                tracing::warn!(error = %e, model_key = %key, "Cooldown not persisted, continuing");
            }
            self.record(
                UsageEvent::new(&top.provider_id, &top.model_id, UsageStatus::Failed)
                    .with_error_class(error_class),
            );
            key
        });

        tracing::info!(
            error_class = %error_class,
            should_retry = recommendation.should_retry,
            should_switch_model = recommendation.should_switch_model,
            failed = failed_candidate.as_ref().map(ModelKey::to_string).unwrap_or_default(),
            "Retry advice computed"
        );

        RetryAdvice {
            recommendation,
            failed_candidate,
            alternate_candidate,
        }
    }

    /// Hook entry point: pick a provider/model override for a prompt
    ///
    /// Blank prompts and KeyRouter's own commands are not routed. `messages`
    /// is used when non-empty, otherwise the prompt becomes one user message.
    pub fn auto_route(&self, prompt: &str, messages: Option<&[Value]>) -> Option<AutoRoute> {
        let prompt = prompt.trim();
        if prompt.is_empty() || prompt.starts_with(COMMAND_PREFIX) {
            return None;
        }

        let payload = match messages {
            Some(messages) if !messages.is_empty() => Value::Array(messages.to_vec()),
            _ => json!([{ "role": "user", "content": prompt }]),
        };

        let decision = self.route_and_record(&payload);
        let top = decision.top()?;
        Some(AutoRoute {
            provider_override: top.provider_id.clone(),
            model_override: top.model_id.clone(),
            decision,
        })
    }

    /// Validate user-supplied quota arguments and overwrite the entry
    ///
    /// # Errors
    /// Returns `AppError::Validation` naming the bad value for a malformed
    /// key, a non-finite `remaining` or a non-RFC 3339 `reset_at`, and
    /// `AppError::StateWrite` if the state cannot be saved.
    pub fn set_quota_from_args(
        &self,
        model_key: &str,
        remaining_raw: &str,
        reset_at: Option<&str>,
    ) -> AppResult<KeyRouterState> {
        let key = ModelKey::parse(model_key)?;
        let remaining = parse_remaining(remaining_raw)?;
        let reset_at = reset_at
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(parse_reset_at)
            .transpose()?;

        let state = self.ledger.set_quota(
            &key,
            QuotaEntry {
                remaining: Some(remaining),
                reset_at,
                cooldown_until: None,
            },
        );
        if state.is_err() {
            self.metrics.state_write_failure();
        }
        state
    }
}

fn parse_remaining(raw: &str) -> AppResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppError::Validation(format!("Invalid remaining value: {raw}")))
}

fn parse_reset_at(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AppError::Validation(format!("Invalid reset time: {raw}")))
}

/// Text report for a retry recommendation
pub fn format_retry_advice(advice: &RetryAdvice) -> String {
    let rec = &advice.recommendation;
    let alternate = advice
        .alternate_candidate
        .as_ref()
        .map(|c| format!("{}/{}", c.provider_id, c.model_id))
        .unwrap_or_else(|| "(none)".to_string());

    [
        "KeyRouter Retry Recommendation".to_string(),
        format!("- errorClass: {}", rec.error_class),
        format!("- shouldRetry: {}", rec.should_retry),
        format!("- shouldSwitchModel: {}", rec.should_switch_model),
        format!(
            "- strategy: {}",
            rec.strategy.map(|s| s.as_str()).unwrap_or("default")
        ),
        format!("- reason: {}", rec.reason),
        format!("- alternateCandidate: {alternate}"),
    ]
    .join("\n")
}
