//! Candidate scoring
//!
//! Scores are higher-is-better and unbounded above, but stay roughly within
//! `[0, 2]` for realistic catalogs. Model-name checks are case-insensitive
//! substring matches against `"provider/model"`.

use super::{RouteDimensionScores, RoutePolicy};
use crate::catalog::{CandidateSeed, ProviderPolicy};

/// Cost assumed for each missing input/output price
pub const MISSING_COST_PENALTY: f64 = 999.0;

/// Score one candidate under `policy`
pub fn score_candidate(
    seed: &CandidateSeed,
    dim: &RouteDimensionScores,
    policy: RoutePolicy,
    provider_policy: Option<&ProviderPolicy>,
) -> f64 {
    let id = seed.model_key().as_str().to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| id.contains(n));
    let cost = total_cost(seed);

    let mut score = match policy {
        RoutePolicy::Cheap => {
            let speed = if has(&["flash", "mini"]) { 0.5 } else { 0.1 };
            1.0 / (1.0 + cost) + dim.latency_sensitivity * speed
        }
        RoutePolicy::Reasoning => {
            let thinker = if has(&["reason", "o3", "thinking"]) { 1.2 } else { 0.2 };
            let coder = if has(&["code", "codex"]) { 0.8 } else { 0.1 };
            dim.reasoning * thinker + dim.coding * coder
        }
        RoutePolicy::Balanced => {
            let strong = if has(&["pro", "sonnet"]) { 0.6 } else { 0.2 };
            dim.complexity * 0.4 + dim.reasoning * strong + 1.0 / (1.0 + cost * 0.6)
        }
    };

    if has(&["gemini-3-flash", "gpt-4o-mini"]) {
        score += dim.latency_sensitivity * 0.2;
    }
    if seed.has_api_key {
        score += 0.05;
    }
    if provider_policy.is_some_and(|p| p.prefers(&seed.provider_id)) {
        score += 0.15;
    }

    score
}

fn total_cost(seed: &CandidateSeed) -> f64 {
    seed.model.input_cost.unwrap_or(MISSING_COST_PENALTY)
        + seed.model.output_cost.unwrap_or(MISSING_COST_PENALTY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CandidateModel;

    fn seed(provider: &str, model: &str, cost: Option<(f64, f64)>, key: bool) -> CandidateSeed {
        CandidateSeed {
            provider_id: provider.to_string(),
            model: CandidateModel {
                id: model.to_string(),
                input_cost: cost.map(|c| c.0),
                output_cost: cost.map(|c| c.1),
                input_modalities: Vec::new(),
            },
            has_api_key: key,
        }
    }

    fn dims() -> RouteDimensionScores {
        RouteDimensionScores {
            complexity: 0.5,
            reasoning: 0.85,
            coding: 0.9,
            multimodal: 0.0,
            tooling: 0.2,
            context_pressure: 0.1,
            latency_sensitivity: 0.85,
            cost_sensitivity: 0.9,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_cheap_score_for_costed_mini_model() {
        let s = score_candidate(
            &seed("openai", "gpt-4o-mini", Some((0.15, 0.6)), false),
            &dims(),
            RoutePolicy::Cheap,
            None,
        );
        // 1/1.75 + 0.85*0.5 + 0.85*0.2
        assert!(close(s, 1.0 / 1.75 + 0.425 + 0.17), "{s}");
    }

    #[test]
    fn test_missing_costs_use_penalty() {
        let s = score_candidate(
            &seed("anthropic", "claude-3-haiku", None, false),
            &dims(),
            RoutePolicy::Cheap,
            None,
        );
        assert!(close(s, 1.0 / 1999.0 + 0.085), "{s}");
    }

    #[test]
    fn test_reasoning_rewards_thinking_and_code_models() {
        let d = dims();
        let o3 = score_candidate(&seed("openai", "o3", None, false), &d, RoutePolicy::Reasoning, None);
        let codex = score_candidate(
            &seed("openai", "codex-mini", None, false),
            &d,
            RoutePolicy::Reasoning,
            None,
        );
        assert!(close(o3, 0.85 * 1.2 + 0.9 * 0.1), "{o3}");
        assert!(close(codex, 0.85 * 0.2 + 0.9 * 0.8), "{codex}");
    }

    #[test]
    fn test_balanced_rewards_pro_models() {
        let d = dims();
        let pro = score_candidate(
            &seed("google", "gemini-pro", Some((1.0, 1.0)), false),
            &d,
            RoutePolicy::Balanced,
            None,
        );
        assert!(close(pro, 0.2 + 0.85 * 0.6 + 1.0 / 2.2), "{pro}");
    }

    #[test]
    fn test_name_matching_is_case_insensitive_and_includes_provider() {
        let d = dims();
        let upper = score_candidate(
            &seed("X", "Model-MINI", Some((1.0, 1.0)), false),
            &d,
            RoutePolicy::Cheap,
            None,
        );
        assert!(close(upper, 1.0 / 3.0 + 0.425), "{upper}");

        // provider id participates in matching
        let flash = score_candidate(
            &seed("flash-host", "plain", Some((1.0, 1.0)), false),
            &d,
            RoutePolicy::Cheap,
            None,
        );
        assert!(close(flash, upper));
    }

    #[test]
    fn test_api_key_and_prefer_bonuses() {
        let d = dims();
        let policy = ProviderPolicy {
            prefer: vec![" openai ".to_string()],
            ..Default::default()
        };
        let base = score_candidate(&seed("openai", "m", None, false), &d, RoutePolicy::Balanced, None);
        let keyed = score_candidate(&seed("openai", "m", None, true), &d, RoutePolicy::Balanced, None);
        let preferred = score_candidate(
            &seed("openai", "m", None, true),
            &d,
            RoutePolicy::Balanced,
            Some(&policy),
        );
        assert!(close(keyed - base, 0.05));
        assert!(close(preferred - keyed, 0.15));
    }
}
