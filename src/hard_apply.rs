//! Pin-mode writers for the host's own files
//!
//! Pin mode makes a routing decision stick by editing the host instead of
//! answering with an override:
//!
//! - the primary model in the catalog file, `agents.list[<id>].model` or
//!   `agents.defaults.model` depending on [`PinScope`]
//! - the `agent:<id>:main` entry of `<agents>/<id>/sessions/sessions.json`
//!
//! Every other field of those documents is written back as it was read.

use crate::config::{PathsConfig, PinScope};
use crate::error::{AppError, AppResult};
use crate::models::PendingPin;
use crate::state::file::atomic_write;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// What one pin pass changed on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinOutcome {
    pub primary_changed: bool,
    pub session_changed: bool,
}

/// Locations of the host files pin mode edits
#[derive(Debug, Clone)]
pub struct HostFiles {
    catalog_path: PathBuf,
    agents_dir: PathBuf,
}

impl HostFiles {
    pub fn new(catalog_path: impl Into<PathBuf>, agents_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            agents_dir: agents_dir.into(),
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(paths.catalog_path(), paths.agents_path())
    }

    /// Session store of one agent
    ///
    /// Returns `None` for ids that are not a single plain path segment.
    pub fn sessions_path(&self, agent_id: &str) -> Option<PathBuf> {
        let plain = !agent_id.is_empty()
            && agent_id != "."
            && agent_id != ".."
            && !agent_id.contains(['/', '\\']);
        plain.then(|| {
            self.agents_dir
                .join(agent_id)
                .join("sessions")
                .join("sessions.json")
        })
    }

    /// Make `model_ref` the primary model of one agent or of every agent
    ///
    /// With [`PinScope::Agent`] and an agent id, only an existing
    /// `agents.list` entry with that id is updated. Otherwise
    /// `agents.defaults.model` is set, creating the catalog file if needed.
    ///
    /// Returns whether the file changed.
    ///
    /// # Errors
    /// Returns an error if the catalog cannot be read, parsed or written.
    pub fn set_primary_model(
        &self,
        agent_id: Option<&str>,
        model_ref: &str,
        scope: PinScope,
    ) -> AppResult<bool> {
        let mut document = read_json(&self.catalog_path)?
            .unwrap_or_else(|| Value::Object(Map::new()));
        let Some(root) = document.as_object_mut() else {
            tracing::warn!(
                path = %self.catalog_path.display(),
                "Host catalog is not a JSON object, primary model left unchanged"
            );
            return Ok(false);
        };

        let changed = match (scope, agent_id) {
            (PinScope::Agent, Some(agent_id)) => pin_agent_entry(root, agent_id, model_ref),
            _ => pin_defaults(root, model_ref),
        };
        if changed {
            write_json(&self.catalog_path, &document)?;
        }
        Ok(changed)
    }

    /// Point the agent's main session at the pinned provider and model
    ///
    /// A missing store or session entry is left alone. Returns whether the
    /// file changed.
    ///
    /// # Errors
    /// Returns an error if the session store cannot be read, parsed or
    /// written.
    pub fn set_session_model(&self, pin: &PendingPin) -> AppResult<bool> {
        let Some(path) = self.sessions_path(&pin.agent_id) else {
            tracing::warn!(agent_id = %pin.agent_id, "Agent id is not a plain name, session left unchanged");
            return Ok(false);
        };
        let Some(mut store) = read_json(&path)? else {
            return Ok(false);
        };

        let session_key = format!("agent:{}:main", pin.agent_id);
        let Some(entry) = store
            .get_mut(session_key.as_str())
            .and_then(Value::as_object_mut)
        else {
            return Ok(false);
        };

        let wanted = [
            ("model", &pin.model_id),
            ("modelOverride", &pin.model_id),
            ("modelProvider", &pin.provider_id),
            ("providerOverride", &pin.provider_id),
        ];
        let changed = wanted
            .iter()
            .any(|(field, value)| entry.get(*field).and_then(Value::as_str) != Some(value.as_str()));
        if !changed {
            return Ok(false);
        }
        for (field, value) in wanted {
            entry.insert(field.to_string(), Value::String(value.clone()));
        }

        write_json(&path, &store)?;
        Ok(true)
    }

    /// Apply a routing decision in pin mode
    ///
    /// The primary model is set per `scope`; the session store is updated
    /// only when the agent is known. Failures are logged and reported as
    /// "unchanged" so a broken host file never fails the hook.
    pub fn apply_pin(
        &self,
        scope: PinScope,
        agent_id: Option<&str>,
        provider_id: &str,
        model_id: &str,
    ) -> PinOutcome {
        let model_ref = format!("{provider_id}/{model_id}");

        let primary_changed = self
            .set_primary_model(agent_id, &model_ref, scope)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, model_ref = %model_ref, "Primary model pin failed");
                false
            });

        let session_changed = match agent_id {
            Some(agent_id) => {
                let pin = PendingPin {
                    agent_id: agent_id.to_string(),
                    provider_id: provider_id.to_string(),
                    model_id: model_id.to_string(),
                };
                self.set_session_model(&pin).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, model_ref = %model_ref, "Session pin failed");
                    false
                })
            }
            None => false,
        };

        if primary_changed {
            tracing::info!(
                model_ref = %model_ref,
                scope = scope.as_str(),
                agent_id = agent_id.unwrap_or("-"),
                "Pinned primary model"
            );
        }
        if session_changed {
            tracing::info!(
                model_ref = %model_ref,
                agent_id = agent_id.unwrap_or("-"),
                "Pinned main session model"
            );
        }

        PinOutcome {
            primary_changed,
            session_changed,
        }
    }
}

/// `model` may be a plain ref or an object with a `primary` ref
fn current_model(model: Option<&Value>) -> Option<&str> {
    match model? {
        Value::String(model_ref) => Some(model_ref.as_str()),
        other => other.get("primary").and_then(Value::as_str),
    }
}

fn pin_agent_entry(root: &mut Map<String, Value>, agent_id: &str, model_ref: &str) -> bool {
    let entry = root
        .get_mut("agents")
        .and_then(|agents| agents.get_mut("list"))
        .and_then(Value::as_array_mut)
        .and_then(|list| {
            list.iter_mut()
                .find(|item| item.get("id").and_then(Value::as_str) == Some(agent_id))
        })
        .and_then(Value::as_object_mut);
    let Some(entry) = entry else {
        tracing::debug!(agent_id, "Agent not listed in host catalog, primary model left unchanged");
        return false;
    };

    if current_model(entry.get("model")) == Some(model_ref) {
        return false;
    }
    entry.insert("model".to_string(), Value::String(model_ref.to_string()));
    true
}

fn pin_defaults(root: &mut Map<String, Value>, model_ref: &str) -> bool {
    let Some(agents) = root
        .entry("agents")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
    else {
        return false;
    };
    let Some(defaults) = agents
        .entry("defaults")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
    else {
        return false;
    };

    if current_model(defaults.get("model")) == Some(model_ref) {
        return false;
    }
    defaults.insert("model".to_string(), Value::String(model_ref.to_string()));
    true
}

/// Parse a host JSON file; missing or blank files read as `None`
fn read_json(path: &Path) -> AppResult<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|source| AppError::HostFileRead {
        path: path.display().to_string(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| AppError::HostFileParse {
            path: path.display().to_string(),
            source,
        })
}

fn write_json(path: &Path, document: &Value) -> AppResult<()> {
    let mut json = serde_json::to_string_pretty(document)
        .map_err(|e| AppError::Internal(format!("Failed to serialize host file: {e}")))?;
    json.push('\n');
    atomic_write(path, json.as_bytes()).map_err(|source| AppError::HostFileWrite {
        path: path.display().to_string(),
        source,
    })
}
