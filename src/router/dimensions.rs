//! Dimension inference and policy selection
//!
//! The default [`KeywordInferencer`] scores a request from its plain text
//! with substring hints. Matching is case-insensitive and unanchored, so a
//! hint embedded in a longer word still counts.

use super::{RouteDimensionScores, RoutePolicy};
use crate::normalizer::NormalizedRequest;

/// Strategy that turns a normalized request into a dimension vector
///
/// Implementations must be pure: the same request always yields the same
/// scores.
pub trait DimensionInferencer: Send + Sync {
    fn infer(&self, request: &NormalizedRequest) -> RouteDimensionScores;
}

const REASONING_HINTS: &[&str] = &["why", "prove", "reason", "analyze", "tradeoff", "formal"];
const CODING_HINTS: &[&str] = &[
    "code",
    "refactor",
    "debug",
    "typescript",
    "python",
    "api",
    "plugin",
];
const LATENCY_HINTS: &[&str] = &["quick", "fast", "brief", "short"];
const COST_HINTS: &[&str] = &["cheap", "low cost", "budget", "save", "free"];

/// Keyword heuristic inferencer
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordInferencer;

impl DimensionInferencer for KeywordInferencer {
    fn infer(&self, request: &NormalizedRequest) -> RouteDimensionScores {
        let text = request.plain_text.to_lowercase();
        let tokens = text.split_whitespace().count() as f64;
        let has_any = |hints: &[&str]| hints.iter().any(|hint| text.contains(hint));

        let complexity = clamp01(tokens / 240.0);
        let reasoning = if has_any(REASONING_HINTS) {
            0.85
        } else {
            clamp01(complexity * 0.6)
        };
        let coding = if has_any(CODING_HINTS) {
            0.9
        } else {
            clamp01(complexity * 0.4)
        };

        RouteDimensionScores {
            complexity,
            reasoning,
            coding,
            multimodal: if request.has_image { 1.0 } else { 0.0 },
            tooling: if request.has_tool_call || request.has_tool_result {
                0.9
            } else {
                0.2
            },
            context_pressure: clamp01(tokens / 1000.0),
            latency_sensitivity: if has_any(LATENCY_HINTS) { 0.85 } else { 0.35 },
            cost_sensitivity: if has_any(COST_HINTS) { 0.9 } else { 0.4 },
        }
    }
}

/// Clamp to `[0, 1]`
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Map a dimension vector to a routing policy (first match wins)
pub fn select_policy(dim: &RouteDimensionScores) -> RoutePolicy {
    if dim.reasoning > 0.72 || dim.complexity > 0.82 {
        return RoutePolicy::Reasoning;
    }
    if dim.cost_sensitivity > 0.75 && dim.latency_sensitivity > 0.6 {
        return RoutePolicy::Cheap;
    }
    RoutePolicy::Balanced
}
