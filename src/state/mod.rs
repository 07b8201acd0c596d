//! Usage & quota state
//!
//! Persisted as one JSON blob holding a bounded usage log and a per-model
//! quota/cooldown table. Every mutation is a full load-mutate-save cycle
//! through a [`StateStore`]; concurrent writers race and the last one wins.

pub mod file;
pub mod ledger;
pub mod memory;

pub use file::FileStateStore;
pub use ledger::{MAX_USAGE_EVENTS, UsageLedger, summarize_quota, summarize_usage};
pub use memory::MemoryStateStore;

use crate::error::AppResult;
use crate::models::{ExclusionSet, ModelKey};
use crate::retry::RetryErrorClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome recorded for one model use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Routed,
    Success,
    Failed,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routed => "routed",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub at: DateTime<Utc>,
    pub provider_id: String,
    pub model_id: String,
    pub status: UsageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_input: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_output: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<RetryErrorClass>,
}

impl UsageEvent {
    /// New event stamped with the current time
    pub fn new(
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
        status: UsageStatus,
    ) -> Self {
        Self {
            at: Utc::now(),
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            status,
            tokens_input: None,
            tokens_output: None,
            error_class: None,
        }
    }

    pub fn with_error_class(mut self, error_class: RetryErrorClass) -> Self {
        self.error_class = Some(error_class);
        self
    }

    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }

    pub fn model_key(&self) -> ModelKey {
        ModelKey::new(&self.provider_id, &self.model_id)
    }
}

/// Quota and cooldown record for one model key
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl QuotaEntry {
    /// Whether a cooldown is still running at `now`
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

/// The whole persisted blob
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct KeyRouterState {
    #[serde(default)]
    pub usage: Vec<UsageEvent>,
    #[serde(default)]
    pub quota: BTreeMap<ModelKey, QuotaEntry>,
}

impl KeyRouterState {
    /// Keys whose cooldown has not yet expired at `now`
    pub fn active_cooldowns(&self, now: DateTime<Utc>) -> ExclusionSet {
        self.quota
            .iter()
            .filter(|(_, entry)| entry.is_cooling_down(now))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Load/save seam for [`KeyRouterState`]
///
/// `load` never fails: a missing, unreadable or corrupt backing store reads
/// as empty state. Only `save` reports errors.
pub trait StateStore: Send + Sync {
    fn load(&self) -> KeyRouterState;

    fn save(&self, state: &KeyRouterState) -> AppResult<()>;
}
