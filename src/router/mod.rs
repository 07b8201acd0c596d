//! Routing logic for KeyRouter
//!
//! Turns a normalized request into a ranked list of provider/model
//! candidates:
//!
//! 1. infer a dimension vector from the request text ([`dimensions`])
//! 2. pick a routing policy from the vector
//! 3. build candidates from the provider catalog and score them ([`scorer`])
//! 4. sort descending, keep at most [`MAX_TOP_CANDIDATES`]
//!
//! Routing never fails. An empty candidate list is a valid outcome.

pub mod dimensions;
pub mod scorer;

pub use dimensions::{DimensionInferencer, KeywordInferencer, select_policy};
pub use scorer::score_candidate;

use crate::catalog::{ProviderCatalog, ProviderPolicy};
use crate::models::{ExclusionSet, ModelKey};
use crate::normalizer::{NormalizedRequest, normalize_request};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Maximum number of ranked candidates in a decision
pub const MAX_TOP_CANDIDATES: usize = 8;

/// Named scoring strategy chosen per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePolicy {
    Cheap,
    Balanced,
    Reasoning,
}

impl RoutePolicy {
    /// Convert to string representation for logging and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Balanced => "balanced",
            Self::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for RoutePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heuristic signal vector derived from a request
///
/// All fields lie in `[0, 1]`. `multimodal` and `tooling` only take the
/// discrete levels `{0, 0.2, 0.9, 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDimensionScores {
    pub complexity: f64,
    pub reasoning: f64,
    pub coding: f64,
    pub multimodal: f64,
    pub tooling: f64,
    pub context_pressure: f64,
    pub latency_sensitivity: f64,
    pub cost_sensitivity: f64,
}

/// One scored provider/model pair
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteCandidate {
    pub provider_id: String,
    pub model_id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cost: Option<f64>,
    pub rationale: String,
}

impl RouteCandidate {
    pub fn model_key(&self) -> ModelKey {
        ModelKey::new(&self.provider_id, &self.model_id)
    }
}

/// Result of a routing call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDecision {
    pub policy: RoutePolicy,
    pub dimensions: RouteDimensionScores,
    /// Descending by score, at most [`MAX_TOP_CANDIDATES`]
    pub top_candidates: Vec<RouteCandidate>,
}

impl RouteDecision {
    /// Highest ranked candidate, if any survived filtering
    pub fn top(&self) -> Option<&RouteCandidate> {
        self.top_candidates.first()
    }
}

/// Per-call routing inputs supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Provider allow/prefer/deny policy
    pub provider_policy: ProviderPolicy,
    /// Model keys removed before scoring (cooldown-aware routing)
    pub excluded: ExclusionSet,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider policy
    pub fn with_provider_policy(mut self, policy: ProviderPolicy) -> Self {
        self.provider_policy = policy;
        self
    }

    /// Set the keys to exclude from candidate lists
    pub fn with_excluded(mut self, excluded: ExclusionSet) -> Self {
        self.excluded = excluded;
        self
    }
}

/// Routes normalized requests over a provider catalog
///
/// The dimension inference strategy is pluggable; [`KeywordInferencer`] is
/// the default.
#[derive(Clone)]
pub struct KeyRouter {
    catalog: Arc<ProviderCatalog>,
    inferencer: Arc<dyn DimensionInferencer>,
}

impl KeyRouter {
    /// Create a router using keyword-based dimension inference
    pub fn new(catalog: ProviderCatalog) -> Self {
        Self::with_inferencer(catalog, KeywordInferencer)
    }

    /// Create a router with a custom dimension inferencer
    pub fn with_inferencer(
        catalog: ProviderCatalog,
        inferencer: impl DimensionInferencer + 'static,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            inferencer: Arc::new(inferencer),
        }
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    /// Same inference strategy over a different catalog
    pub fn with_catalog(&self, catalog: ProviderCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            inferencer: Arc::clone(&self.inferencer),
        }
    }

    /// Normalize a raw payload and route it
    pub fn route_payload(
        &self,
        payload: &serde_json::Value,
        options: &RouteOptions,
    ) -> RouteDecision {
        self.route(&normalize_request(payload), options)
    }

    /// Rank catalog candidates for a normalized request
    pub fn route(&self, request: &NormalizedRequest, options: &RouteOptions) -> RouteDecision {
        let dimensions = self.inferencer.infer(request);
        let policy = select_policy(&dimensions);
        let provider_policy = &options.provider_policy;

        let mut seeds = self
            .catalog
            .candidates(Some(provider_policy), request.has_image);
        let eligible = seeds.len();
        seeds.retain(|seed| !options.excluded.contains(&seed.model_key()));
        let excluded = eligible - seeds.len();

        let mut candidates: Vec<RouteCandidate> = seeds
            .into_iter()
            .map(|seed| {
                let score = score_candidate(&seed, &dimensions, policy, Some(provider_policy));
                RouteCandidate {
                    rationale: format!(
                        "policy={}, apiKey={}",
                        policy,
                        if seed.has_api_key { "yes" } else { "no" }
                    ),
                    provider_id: seed.provider_id,
                    model_id: seed.model.id,
                    score,
                    input_cost: seed.model.input_cost,
                    output_cost: seed.model.output_cost,
                }
            })
            .collect();

        // Stable sort: equal scores keep catalog order
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(MAX_TOP_CANDIDATES);

        tracing::debug!(
            policy = %policy,
            eligible,
            excluded,
            returned = candidates.len(),
            top = candidates.first().map(|c| c.model_key().to_string()).unwrap_or_default(),
            "Routing decision computed"
        );

        RouteDecision {
            policy,
            dimensions,
            top_candidates: candidates,
        }
    }
}

/// Render a decision as the text report shown to users
pub fn format_decision(decision: &RouteDecision) -> String {
    let dimensions =
        serde_json::to_string(&decision.dimensions).unwrap_or_else(|_| "{}".to_string());
    let mut lines = vec![
        "KeyRouter Route Decision".to_string(),
        format!("- Policy: {}", decision.policy),
        format!("- Dimensions: {dimensions}"),
        "- Top candidates:".to_string(),
    ];

    if decision.top_candidates.is_empty() {
        lines.push("  - (none)".to_string());
    }
    for c in &decision.top_candidates {
        lines.push(format!(
            "  - {}/{}: score={:.4}, cost={}/{}, {}",
            c.provider_id,
            c.model_id,
            c.score,
            cost_label(c.input_cost),
            cost_label(c.output_cost),
            c.rationale
        ));
    }

    lines.join("\n")
}

fn cost_label(cost: Option<f64>) -> String {
    cost.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn catalog(json: &str) -> ProviderCatalog {
        ProviderCatalog::from_str(json).expect("should parse catalog")
    }

    fn scenario_catalog() -> ProviderCatalog {
        catalog(
            r#"{"models": {"providers": {
                "openai": {"models": [{"id": "gpt-4o-mini", "cost": {"input": 0.15, "output": 0.6}}]},
                "anthropic": {"models": [{"id": "claude-3-haiku"}]}
            }}}"#,
        )
    }

    #[test]
    fn test_route_policy_as_str() {
        assert_eq!(RoutePolicy::Cheap.as_str(), "cheap");
        assert_eq!(RoutePolicy::Balanced.as_str(), "balanced");
        assert_eq!(RoutePolicy::Reasoning.as_str(), "reasoning");
    }

    #[test]
    fn test_route_policy_serde() {
        assert_eq!(
            serde_json::from_str::<RoutePolicy>(r#""reasoning""#).unwrap(),
            RoutePolicy::Reasoning
        );
        assert_eq!(
            serde_json::to_string(&RoutePolicy::Cheap).unwrap(),
            r#""cheap""#
        );
    }

    #[test]
    fn test_cheap_prompt_prefers_costed_mini_model() {
        let router = KeyRouter::new(scenario_catalog());
        let decision = router.route_payload(&json!("quick cheap summary"), &RouteOptions::new());

        assert_eq!(decision.policy, RoutePolicy::Cheap);
        let top = decision.top().expect("should have a candidate");
        assert_eq!(top.model_key().as_str(), "openai/gpt-4o-mini");
        assert_eq!(decision.top_candidates[1].model_id, "claude-3-haiku");
    }

    #[test]
    fn test_empty_catalog_yields_no_candidates() {
        let router = KeyRouter::new(ProviderCatalog::default());
        let decision = router.route_payload(&json!("hello"), &RouteOptions::new());
        assert!(decision.top_candidates.is_empty());
        assert!(decision.top().is_none());
    }

    #[test]
    fn test_truncates_to_eight_candidates() {
        let models: Vec<serde_json::Value> =
            (0..12).map(|i| json!({"id": format!("m-{i}")})).collect();
        let doc = json!({"models": {"providers": {"p": {"models": models}}}});
        let router = KeyRouter::new(catalog(&doc.to_string()));

        let decision = router.route_payload(&json!("hi"), &RouteOptions::new());
        assert_eq!(decision.top_candidates.len(), MAX_TOP_CANDIDATES);
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let router = KeyRouter::new(catalog(
            r#"{"models": {"providers": {
                "b": {"models": [{"id": "same"}]},
                "a": {"models": [{"id": "same"}]},
                "c": {"models": [{"id": "same"}]}
            }}}"#,
        ));
        let decision = router.route_payload(&json!("hi"), &RouteOptions::new());
        let order: Vec<&str> = decision
            .top_candidates
            .iter()
            .map(|c| c.provider_id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_scores_are_descending() {
        let router = KeyRouter::new(catalog(
            r#"{"models": {"providers": {
                "x": {"models": [{"id": "plain"}, {"id": "gemini-pro", "cost": {"input": 1, "output": 2}}]},
                "y": {"apiKey": "k", "models": [{"id": "o3-mini", "cost": {"input": 0.5, "output": 1}}]}
            }}}"#,
        ));
        let decision = router.route_payload(
            &json!("analyze the tradeoff in this design"),
            &RouteOptions::new(),
        );
        let scores: Vec<f64> = decision.top_candidates.iter().map(|c| c.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{scores:?}");
    }

    #[test]
    fn test_excluded_keys_are_not_scored() {
        let router = KeyRouter::new(scenario_catalog());
        let options = RouteOptions::new()
            .with_excluded([ModelKey::new("openai", "gpt-4o-mini")].into_iter().collect());
        let decision = router.route_payload(&json!("quick cheap summary"), &options);

        assert_eq!(decision.top_candidates.len(), 1);
        assert_eq!(decision.top_candidates[0].provider_id, "anthropic");
    }

    #[test]
    fn test_rationale_mentions_policy_and_key() {
        let router = KeyRouter::new(catalog(
            r#"{"models": {"providers": {"p": {"apiKey": "k", "models": [{"id": "m"}]}}}}"#,
        ));
        let decision = router.route_payload(&json!("hello"), &RouteOptions::new());
        assert_eq!(
            decision.top_candidates[0].rationale,
            "policy=balanced, apiKey=yes"
        );
    }

    #[test]
    fn test_format_decision_lists_candidates() {
        let router = KeyRouter::new(scenario_catalog());
        let decision = router.route_payload(&json!("quick cheap summary"), &RouteOptions::new());
        let text = format_decision(&decision);

        assert!(text.starts_with("KeyRouter Route Decision"));
        assert!(text.contains("- Policy: cheap"));
        assert!(text.contains("\"latencySensitivity\":0.85"));
        assert!(text.contains("  - openai/gpt-4o-mini: score="));
        assert!(text.contains("cost=0.15/0.6, policy=cheap, apiKey=no"));
        assert!(text.contains("  - anthropic/claude-3-haiku: score=0.0855, cost=?/?"));
    }

    #[test]
    fn test_format_decision_without_candidates() {
        let router = KeyRouter::new(ProviderCatalog::default());
        let text = format_decision(&router.route_payload(&json!("x"), &RouteOptions::new()));
        assert!(text.ends_with("- Top candidates:\n  - (none)"));
    }

    #[test]
    fn test_custom_inferencer_drives_policy() {
        struct AlwaysReasoning;
        impl DimensionInferencer for AlwaysReasoning {
            fn infer(&self, _request: &NormalizedRequest) -> RouteDimensionScores {
                RouteDimensionScores {
                    complexity: 0.0,
                    reasoning: 1.0,
                    coding: 0.0,
                    multimodal: 0.0,
                    tooling: 0.2,
                    context_pressure: 0.0,
                    latency_sensitivity: 0.35,
                    cost_sensitivity: 0.4,
                }
            }
        }

        let router = KeyRouter::with_inferencer(scenario_catalog(), AlwaysReasoning);
        let decision = router.route_payload(&json!("quick cheap summary"), &RouteOptions::new());
        assert_eq!(decision.policy, RoutePolicy::Reasoning);
    }
}
