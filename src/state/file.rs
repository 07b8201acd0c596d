//! Filesystem-backed state store

use super::{KeyRouterState, QuotaEntry, StateStore, UsageEvent};
use crate::error::{AppError, AppResult};
use crate::models::ModelKey;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Stores state as pretty-printed JSON at a fixed path
///
/// The parent directory is created on first save. Writes go through a
/// uniquely named temp file and a rename so readers never observe a
/// half-written blob. Loading keeps every event and quota entry that still
/// decodes.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: std::io::Error) -> AppError {
        AppError::StateWrite {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> KeyRouterState {
        if !self.path.exists() {
            return KeyRouterState::default();
        }

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read state file, starting from empty state"
                );
                return KeyRouterState::default();
            }
        };
        if raw.trim().is_empty() {
            return KeyRouterState::default();
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => decode_lenient(value, &self.path),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "State file is not valid JSON, starting from empty state"
                );
                KeyRouterState::default()
            }
        }
    }

    fn save(&self, state: &KeyRouterState) -> AppResult<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| AppError::Internal(format!("Failed to serialize state: {e}")))?;
        atomic_write(&self.path, json.as_bytes()).map_err(|e| self.write_error(e))?;

        tracing::debug!(
            path = %self.path.display(),
            usage_events = state.usage.len(),
            quota_entries = state.quota.len(),
            "Persisted router state"
        );
        Ok(())
    }
}

/// Decode element by element so one unreadable event or quota entry does
/// not discard its neighbours
fn decode_lenient(value: Value, path: &Path) -> KeyRouterState {
    let section = |name: &str| value.get(name).cloned().unwrap_or(Value::Null);

    let usage = match section("usage") {
        Value::Null => Vec::new(),
        Value::Array(items) => decode_usage(items, path),
        other => {
            tracing::warn!(
                path = %path.display(),
                found = json_type(&other),
                "Usage log is not an array, dropping it"
            );
            Vec::new()
        }
    };
    let quota = match section("quota") {
        Value::Null => BTreeMap::new(),
        Value::Object(entries) => decode_quota(entries, path),
        other => {
            tracing::warn!(
                path = %path.display(),
                found = json_type(&other),
                "Quota table is not an object, dropping it"
            );
            BTreeMap::new()
        }
    };

    KeyRouterState { usage, quota }
}

fn decode_usage(items: Vec<Value>, path: &Path) -> Vec<UsageEvent> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    index,
                    error = %e,
                    "Dropping unreadable usage event"
                );
                None
            }
        })
        .collect()
}

fn decode_quota(entries: Map<String, Value>, path: &Path) -> BTreeMap<ModelKey, QuotaEntry> {
    entries
        .into_iter()
        .filter_map(|(key, raw)| {
            let Value::Object(fields) = raw else {
                tracing::warn!(
                    path = %path.display(),
                    model_key = %key,
                    "Dropping quota entry that is not an object"
                );
                return None;
            };
            let entry = QuotaEntry {
                remaining: quota_field(&fields, "remaining", &key, path),
                reset_at: quota_field(&fields, "resetAt", &key, path),
                cooldown_until: quota_field(&fields, "cooldownUntil", &key, path),
            };
            Some((ModelKey::from(key.as_str()), entry))
        })
        .collect()
}

/// One optional quota field; an unreadable value reads as absent
fn quota_field<T: DeserializeOwned>(
    fields: &Map<String, Value>,
    name: &str,
    key: &str,
    path: &Path,
) -> Option<T> {
    let raw = fields.get(name).filter(|v| !v.is_null())?;
    match serde_json::from_value(raw.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                model_key = %key,
                field = name,
                value = %raw,
                error = %e,
                "Ignoring unreadable quota field"
            );
            None
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Write data atomically using temp file + rename
///
/// Each call writes its own temp file next to `path`, so concurrent writers
/// never rename each other's partial output into place.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let result = std::fs::write(&temp_path, data).and_then(|()| std::fs::rename(&temp_path, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{UsageLedger, UsageStatus};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FileStateStore {
        FileStateStore::new(dir.path().join("keyrouter").join("state.json"))
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store_in(&dir).load(), KeyRouterState::default());
    }

    #[test]
    fn test_save_creates_directory_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut state = KeyRouterState::default();
        state
            .usage
            .push(UsageEvent::new("openai", "gpt-4o", UsageStatus::Routed));
        state.quota.insert(
            ModelKey::from("openai/gpt-4o"),
            QuotaEntry {
                remaining: Some(5.0),
                ..Default::default()
            },
        );
        store.save(&state).unwrap();

        assert!(store.path().exists());
        assert_eq!(temp_files(&dir).len(), 0);
        assert_eq!(store.load(), state);
    }

    fn temp_files(dir: &TempDir) -> Vec<PathBuf> {
        std::fs::read_dir(dir.path().join("keyrouter"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "tmp"))
            .collect()
    }

    fn write_raw(store: &FileStateStore, raw: &str) {
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), raw).unwrap();
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        assert_eq!(store.load(), KeyRouterState::default());
    }

    #[test]
    fn test_blank_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "  \n").unwrap();

        assert_eq!(store.load(), KeyRouterState::default());
    }

    #[test]
    fn test_bad_usage_section_keeps_quota() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"usage": "oops", "quota": {"a/b": {"remaining": 3}}}"#,
        )
        .unwrap();

        let state = store.load();
        assert!(state.usage.is_empty());
        assert_eq!(state.quota[&ModelKey::from("a/b")].remaining, Some(3.0));
    }

    #[test]
    fn test_save_into_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let store = FileStateStore::new(blocker.join("state.json"));

        let err = store.save(&KeyRouterState::default()).unwrap_err();
        assert!(matches!(err, AppError::StateWrite { .. }));
    }

    #[test]
    fn test_unreadable_event_keeps_the_rest_of_the_log() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        write_raw(
            &store,
            r#"{"usage": [
                {"at": "2026-01-02T03:04:05.000Z", "providerId": "a", "modelId": "b", "status": "routed"},
                {"at": "not-a-date", "providerId": "a", "modelId": "b", "status": "routed"},
                {"at": "2026-01-02T03:04:06Z", "providerId": "c", "modelId": "d", "status": "failed"}
            ]}"#,
        );

        let state = store.load();
        assert_eq!(state.usage.len(), 2);
        assert_eq!(state.usage[0].model_key().as_str(), "a/b");
        assert_eq!(state.usage[1].model_key().as_str(), "c/d");
    }

    #[test]
    fn test_unreadable_quota_fields_keep_the_entry() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        write_raw(
            &store,
            r#"{"quota": {
                "a/b": {"resetAt": "tomorrow", "remaining": 4},
                "c/d": {"remaining": 5, "cooldownUntil": "2026-03-01T00:00:00Z"},
                "e/f": "garbage"
            }}"#,
        );

        let state = store.load();
        assert_eq!(state.quota.len(), 2);
        let ab = &state.quota[&ModelKey::from("a/b")];
        assert_eq!(ab.remaining, Some(4.0));
        assert!(ab.reset_at.is_none());
        let cd = &state.quota[&ModelKey::from("c/d")];
        assert_eq!(cd.remaining, Some(5.0));
        assert!(cd.cooldown_until.is_some());
    }

    #[test]
    fn test_concurrent_writers_never_fail() {
        let dir = TempDir::new().unwrap();
        let ledger = UsageLedger::new(Arc::new(store_in(&dir)));

        let failures: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let ledger = ledger.clone();
                    scope.spawn(move || {
                        (0..25)
                            .filter(|i| {
                                let model = format!("m-{t}-{i}");
                                ledger
                                    .record_usage(UsageEvent::new("p", &model, UsageStatus::Routed))
                                    .is_err()
                            })
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(failures, 0);
        let raw = std::fs::read_to_string(store_in(&dir).path()).unwrap();
        let persisted: KeyRouterState = serde_json::from_str(&raw).unwrap();
        assert!(!persisted.usage.is_empty());
        assert!(temp_files(&dir).is_empty());
    }
}
