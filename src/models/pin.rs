//! Session pin cache
//!
//! Remembers a routing decision per session between the `before_agent_start`
//! and `agent_end` hooks. Entries expire after a fixed TTL and the map is
//! bounded so abandoned sessions cannot grow it without limit.

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// A routing decision waiting for its session to finish
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPin {
    pub agent_id: String,
    pub provider_id: String,
    pub model_id: String,
}

impl PendingPin {
    pub fn model_ref(&self) -> String {
        format!("{}/{}", self.provider_id, self.model_id)
    }
}

#[derive(Clone, Debug)]
struct PinEntry {
    pin: PendingPin,
    inserted: Instant,
}

/// Bounded, expiring map from session key to pending pin
pub struct PinCache {
    entries: RwLock<HashMap<String, PinEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl PinCache {
    /// Maximum number of pending pins kept at once
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn is_expired(&self, entry: &PinEntry, now: Instant) -> bool {
        now.duration_since(entry.inserted) >= self.ttl
    }

    /// Remember `pin` for `session_key`, replacing any earlier pin
    ///
    /// At capacity, expired entries are dropped first, then the oldest one.
    pub async fn remember(&self, session_key: &str, pin: PendingPin) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        if !entries.contains_key(session_key) && entries.len() >= self.capacity {
            let before = entries.len();
            entries.retain(|_, entry| !self.is_expired(entry, now));

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }

            tracing::warn!(
                evicted = before - entries.len(),
                capacity = self.capacity,
                "Session pin cache at capacity, evicted stale entries"
            );
        }

        tracing::debug!(
            session_key = %session_key,
            model_ref = %pin.model_ref(),
            "Remembered pending session pin"
        );
        entries.insert(
            session_key.to_string(),
            PinEntry { pin, inserted: now },
        );
    }

    /// Remove and return the pin for `session_key` if it has not expired
    pub async fn take(&self, session_key: &str) -> Option<PendingPin> {
        let mut entries = self.entries.write().await;
        let entry = entries.remove(session_key)?;

        if self.is_expired(&entry, Instant::now()) {
            tracing::debug!(
                session_key = %session_key,
                "Discarded expired session pin"
            );
            return None;
        }
        Some(entry.pin)
    }

    /// Number of live (unexpired) pins
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        let now = Instant::now();
        entries
            .values()
            .filter(|entry| !self.is_expired(entry, now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
