//! Error classification and retry advice
//!
//! Free-text provider errors are bucketed into a closed taxonomy with
//! case-insensitive substring checks, then mapped to a retry/fallback
//! recommendation.

use crate::router::RouteCandidate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default attempt budget for [`retry_recommendation`]
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Kind of provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryErrorClass {
    QuotaExhausted,
    RateLimited,
    AuthInvalid,
    TransientNetwork,
    ServerError,
    Unknown,
}

impl RetryErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExhausted => "quota_exhausted",
            Self::RateLimited => "rate_limited",
            Self::AuthInvalid => "auth_invalid",
            Self::TransientNetwork => "transient_network",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }

    /// Cooldown applied to a model key after a failure of this class
    pub fn cooldown_minutes(&self) -> u32 {
        match self {
            Self::QuotaExhausted => 10,
            Self::RateLimited => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for RetryErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Default,
    ImmediateFallback,
}

impl RetryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::ImmediateFallback => "immediate_fallback",
        }
    }
}

/// What the caller should do after a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRecommendation {
    pub error_class: RetryErrorClass,
    pub should_retry: bool,
    pub should_switch_model: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RetryStrategy>,
    pub reason: String,
}

/// Ordered classification rules; first match wins
const RULES: &[(RetryErrorClass, &[&str])] = &[
    (
        RetryErrorClass::QuotaExhausted,
        &["quota", "insufficient_quota", "billing"],
    ),
    (
        RetryErrorClass::RateLimited,
        &["429", "rate limit", "too many requests"],
    ),
    (
        RetryErrorClass::AuthInvalid,
        &["401", "403", "invalid api key", "unauthorized"],
    ),
    (
        RetryErrorClass::TransientNetwork,
        &["timeout", "econnreset", "network", "temporar"],
    ),
    (
        RetryErrorClass::ServerError,
        &["500", "502", "503", "504", "internal error"],
    ),
];

/// Classify a free-text error message
pub fn classify_error(message: &str) -> RetryErrorClass {
    let message = message.to_lowercase();
    RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| message.contains(n)))
        .map(|(class, _)| *class)
        .unwrap_or(RetryErrorClass::Unknown)
}

/// Recommend retry/switch behavior for a failure
///
/// `attempt` counts from 1; attempts are left while `attempt < max_attempts`.
pub fn retry_recommendation(
    error_class: RetryErrorClass,
    attempt: u32,
    max_attempts: u32,
    has_tooling: bool,
) -> RetryRecommendation {
    let attempts_left = attempt < max_attempts;

    let (should_retry, should_switch_model, strategy, reason) = match error_class {
        RetryErrorClass::QuotaExhausted if has_tooling => (
            attempts_left,
            true,
            Some(RetryStrategy::ImmediateFallback),
            "hard quota during tool workflow; rapid fallback to reliable redundant model",
        ),
        RetryErrorClass::QuotaExhausted => (
            attempts_left,
            true,
            Some(RetryStrategy::Default),
            "hard quota condition; switch candidate tier/provider",
        ),
        RetryErrorClass::RateLimited => (
            attempts_left,
            true,
            None,
            "rate limit encountered; switch to adjacent model or provider",
        ),
        RetryErrorClass::AuthInvalid => (
            false,
            true,
            None,
            "credentials invalid; do not retry same provider key",
        ),
        RetryErrorClass::TransientNetwork => (
            attempts_left,
            false,
            None,
            "transient transport issue; retry same target first",
        ),
        RetryErrorClass::ServerError => (
            attempts_left,
            attempts_left,
            None,
            "server instability; retry then switch on repeated failures",
        ),
        RetryErrorClass::Unknown => (
            attempts_left,
            attempts_left,
            None,
            "unknown error; conservative bounded retry with fallback",
        ),
    };

    RetryRecommendation {
        error_class,
        should_retry,
        should_switch_model,
        strategy,
        reason: reason.to_string(),
    }
}

/// Candidate ranked right after `current_index`, if any
pub fn next_candidate(
    candidates: &[RouteCandidate],
    current_index: usize,
) -> Option<&RouteCandidate> {
    candidates.get(current_index.checked_add(1)?)
}
