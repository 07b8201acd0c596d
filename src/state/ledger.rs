//! Usage ledger: load-mutate-save operations over a [`StateStore`]

use super::{KeyRouterState, QuotaEntry, StateStore, UsageEvent, UsageStatus};
use crate::error::AppResult;
use crate::models::{ExclusionSet, ModelKey};
use crate::retry::RetryErrorClass;
use chrono::{Duration, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum number of usage events kept; older ones are dropped first
pub const MAX_USAGE_EVENTS: usize = 1000;

/// Usage and quota bookkeeping
///
/// Each operation loads the full state, mutates it and saves it back,
/// returning the updated state. There is no locking across the cycle.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn StateStore>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Current persisted state
    pub fn state(&self) -> KeyRouterState {
        self.store.load()
    }

    fn update(&self, mutate: impl FnOnce(&mut KeyRouterState)) -> AppResult<KeyRouterState> {
        let mut state = self.store.load();
        mutate(&mut state);
        self.store.save(&state)?;
        Ok(state)
    }

    /// Append an event stamped with the current time
    pub fn record_usage(&self, mut event: UsageEvent) -> AppResult<KeyRouterState> {
        event.at = Utc::now();
        tracing::debug!(
            model_key = %event.model_key(),
            status = event.status.as_str(),
            error_class = event.error_class.map(|c| c.as_str()).unwrap_or("-"),
            "Recording usage event"
        );

        self.update(|state| {
            state.usage.push(event);
            if state.usage.len() > MAX_USAGE_EVENTS {
                let overflow = state.usage.len() - MAX_USAGE_EVENTS;
                state.usage.drain(..overflow);
            }
        })
    }

    /// Replace the quota entry for `key` wholesale
    pub fn set_quota(&self, key: &ModelKey, entry: QuotaEntry) -> AppResult<KeyRouterState> {
        tracing::info!(model_key = %key, remaining = ?entry.remaining, "Setting quota entry");
        self.update(|state| {
            state.quota.insert(key.clone(), entry);
        })
    }

    /// Start a cooldown of `minutes` for `key`, keeping the rest of its entry
    pub fn apply_cooldown(&self, key: &ModelKey, minutes: u32) -> AppResult<KeyRouterState> {
        let until = Utc::now() + Duration::minutes(i64::from(minutes));
        tracing::info!(
            model_key = %key,
            minutes,
            cooldown_until = %until.to_rfc3339_opts(SecondsFormat::Secs, true),
            "Applying cooldown"
        );
        self.update(|state| {
            state.quota.entry(key.clone()).or_default().cooldown_until = Some(until);
        })
    }

    /// Cool down `key` for the duration tied to `error_class`
    pub fn mark_failure_with_error(
        &self,
        key: &ModelKey,
        error_class: RetryErrorClass,
    ) -> AppResult<KeyRouterState> {
        self.apply_cooldown(key, error_class.cooldown_minutes())
    }

    /// Keys currently cooling down
    pub fn active_cooldowns(&self) -> ExclusionSet {
        self.store.load().active_cooldowns(Utc::now())
    }
}

#[derive(Debug, Default)]
struct UsageTally {
    total: usize,
    routed: usize,
    success: usize,
    failed: usize,
}

/// Per-model usage report, models in first-seen order
pub fn summarize_usage(state: &KeyRouterState) -> String {
    let mut lines = vec![
        "KeyRouter Usage Summary".to_string(),
        format!("- Events: {}", state.usage.len()),
    ];

    let mut order: Vec<ModelKey> = Vec::new();
    let mut tallies: HashMap<ModelKey, UsageTally> = HashMap::new();
    for event in &state.usage {
        let key = event.model_key();
        let tally = tallies.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            UsageTally::default()
        });
        tally.total += 1;
        match event.status {
            UsageStatus::Routed => tally.routed += 1,
            UsageStatus::Success => tally.success += 1,
            UsageStatus::Failed => tally.failed += 1,
        }
    }

    if order.is_empty() {
        lines.push("- No usage yet".to_string());
    } else {
        lines.push("- By model:".to_string());
        for key in &order {
            let t = &tallies[key];
            lines.push(format!(
                "  - {key}: total={}, routed={}, success={}, failed={}",
                t.total, t.routed, t.success, t.failed
            ));
        }
    }

    lines.join("\n")
}

/// Quota table report, sorted by key
pub fn summarize_quota(state: &KeyRouterState) -> String {
    let mut lines = vec![
        "KeyRouter Quota Summary".to_string(),
        format!("- Entries: {}", state.quota.len()),
    ];

    if state.quota.is_empty() {
        lines.push("- No quota records yet".to_string());
        return lines.join("\n");
    }

    let stamp = |t: &chrono::DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Millis, true);
    for (key, q) in &state.quota {
        lines.push(format!(
            "  - {key}: remaining={}, resetAt={}, cooldownUntil={}",
            q.remaining.map(|r| r.to_string()).unwrap_or_else(|| "?".into()),
            q.reset_at.as_ref().map(stamp).unwrap_or_else(|| "?".into()),
            q.cooldown_until.as_ref().map(stamp).unwrap_or_else(|| "-".into()),
        ));
    }

    lines.join("\n")
}
