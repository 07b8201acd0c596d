//! Provider catalog and candidate construction
//!
//! Reads the host's provider → model catalog (JSON), flattens it into
//! scoreable [`CandidateSeed`]s and applies the allow/deny provider policy.
//! Provider order follows the catalog document; it is the tie-break order
//! for equally scored candidates. Sections of the wrong JSON type are
//! treated as absent.

use crate::error::{AppError, AppResult};
use crate::models::ModelKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

/// Per-request provider routing policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderPolicy {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub prefer: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl ProviderPolicy {
    /// Trimmed, non-empty provider names of a policy list
    fn names(list: &[String]) -> HashSet<&str> {
        list.iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn allows(&self, provider_id: &str) -> bool {
        let allow = Self::names(&self.allow);
        if Self::names(&self.deny).contains(provider_id) {
            return false;
        }
        allow.is_empty() || allow.contains(provider_id)
    }

    pub fn prefers(&self, provider_id: &str) -> bool {
        Self::names(&self.prefer).contains(provider_id)
    }
}

/// Input modalities and pricing of one model as the scorer sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateModel {
    pub id: String,
    pub input_cost: Option<f64>,
    pub output_cost: Option<f64>,
    pub input_modalities: Vec<String>,
}

impl CandidateModel {
    pub fn supports_image(&self) -> bool {
        self.input_modalities.iter().any(|m| m == "image")
    }
}

/// A provider/model pair eligible for scoring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSeed {
    pub provider_id: String,
    pub model: CandidateModel,
    pub has_api_key: bool,
}

impl CandidateSeed {
    pub fn model_key(&self) -> ModelKey {
        ModelKey::new(&self.provider_id, &self.model.id)
    }
}

/// One configured provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderEntry {
    pub base_url: Option<String>,
    pub api: Option<String>,
    pub api_key: Option<String>,
    pub models: Vec<CandidateModel>,
    /// Length of the `models` array, including entries without an id
    pub declared_models: usize,
}

impl ProviderEntry {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Lenient conversion: fields with unexpected types are ignored, models
    /// without a string id are skipped.
    fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        let declared = value.get("models").and_then(Value::as_array);
        let models = declared
            .map(|models| models.iter().filter_map(Self::model_from_value).collect())
            .unwrap_or_default();

        Self {
            base_url: text("baseUrl"),
            api: text("api"),
            api_key: text("apiKey"),
            models,
            declared_models: declared.map_or(0, Vec::len),
        }
    }

    fn model_from_value(value: &Value) -> Option<CandidateModel> {
        let id = value.get("id")?.as_str()?.to_string();
        let input_modalities = value
            .get("input")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let cost = value.get("cost");
        let cost_of = |key: &str| cost.and_then(|c| c.get(key)).and_then(Value::as_f64);

        Some(CandidateModel {
            id,
            input_cost: cost_of("input"),
            output_cost: cost_of("output"),
            input_modalities,
        })
    }
}

/// The externally supplied provider catalog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderCatalog {
    providers: Vec<(String, ProviderEntry)>,
    auth_profile_count: usize,
}

impl ProviderCatalog {
    /// Build a catalog from providers in enumeration order
    pub fn new(providers: Vec<(String, ProviderEntry)>) -> Self {
        Self {
            providers,
            auth_profile_count: 0,
        }
    }

    /// Load the catalog from a JSON file
    ///
    /// A missing or blank file is an empty catalog. Malformed JSON is an
    /// error: the catalog belongs to the host and should be fixed there.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let path_display = path.display().to_string();

        if !path.exists() {
            tracing::debug!(path = %path_display, "Provider catalog not found, using empty catalog");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|source| AppError::CatalogRead {
                path: path_display.clone(),
                source,
            })?;

        Self::parse(&content, &path_display)
    }

    fn parse(content: &str, origin: &str) -> AppResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let document: Value =
            serde_json::from_str(content).map_err(|source| AppError::CatalogParseFailed {
                path: origin.to_string(),
                source,
            })?;

        let auth_profile_count = document
            .pointer("/auth/profiles")
            .and_then(Value::as_object)
            .map_or(0, |profiles| profiles.len());
        let providers: Vec<(String, ProviderEntry)> = document
            .pointer("/models/providers")
            .and_then(Value::as_object)
            .map(|providers| {
                providers
                    .iter()
                    .map(|(id, value)| (id.clone(), ProviderEntry::from_value(value)))
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(
            providers = providers.len(),
            auth_profiles = auth_profile_count,
            "Loaded provider catalog"
        );

        Ok(Self {
            providers,
            auth_profile_count,
        })
    }

    pub fn providers(&self) -> &[(String, ProviderEntry)] {
        &self.providers
    }

    pub fn auth_profile_count(&self) -> usize {
        self.auth_profile_count
    }

    /// Flatten provider → models into one candidate list
    pub fn flatten(&self) -> Vec<CandidateSeed> {
        self.providers
            .iter()
            .flat_map(|(provider_id, provider)| {
                let has_api_key = provider.has_api_key();
                provider.models.iter().map(move |model| CandidateSeed {
                    provider_id: provider_id.clone(),
                    model: model.clone(),
                    has_api_key,
                })
            })
            .collect()
    }

    /// Candidates that survive provider policy and the multimodal filter
    pub fn candidates(
        &self,
        policy: Option<&ProviderPolicy>,
        requires_image: bool,
    ) -> Vec<CandidateSeed> {
        apply_provider_policy(self.flatten(), policy)
            .into_iter()
            .filter(|seed| matches_multimodal(seed, requires_image))
            .collect()
    }
}

impl FromStr for ProviderCatalog {
    type Err = AppError;

    fn from_str(json: &str) -> Result<Self, Self::Err> {
        Self::parse(json, "<string>")
    }
}

/// Remove denied providers, then narrow to the allow list when one is set
pub fn apply_provider_policy(
    seeds: Vec<CandidateSeed>,
    policy: Option<&ProviderPolicy>,
) -> Vec<CandidateSeed> {
    match policy {
        Some(policy) => seeds
            .into_iter()
            .filter(|seed| policy.allows(&seed.provider_id))
            .collect(),
        None => seeds,
    }
}

/// Image requests need a model that advertises image input
pub fn matches_multimodal(seed: &CandidateSeed, requires_image: bool) -> bool {
    !requires_image || seed.model.supports_image()
}

/// Provider summary for the audit report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestedProvider {
    pub id: String,
    pub model_count: usize,
    pub has_api_key: bool,
}

/// What the router can see of the host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestedSnapshot {
    pub auth_profile_count: usize,
    pub providers: Vec<IngestedProvider>,
}

pub fn ingest_snapshot(catalog: &ProviderCatalog) -> IngestedSnapshot {
    let mut providers: Vec<IngestedProvider> = catalog
        .providers()
        .iter()
        .map(|(id, provider)| IngestedProvider {
            id: id.clone(),
            model_count: provider.declared_models,
            has_api_key: provider.has_api_key(),
        })
        .collect();
    providers.sort_by(|a, b| a.id.cmp(&b.id));

    IngestedSnapshot {
        auth_profile_count: catalog.auth_profile_count(),
        providers,
    }
}

pub fn format_snapshot(snapshot: &IngestedSnapshot) -> String {
    let mut lines = vec![
        "KeyRouter Ingest Report".to_string(),
        format!("- Auth profiles: {}", snapshot.auth_profile_count),
        format!("- Providers: {}", snapshot.providers.len()),
    ];
    for provider in &snapshot.providers {
        lines.push(format!(
            "  - {}: models={}, apiKey={}",
            provider.id,
            provider.model_count,
            if provider.has_api_key { "yes" } else { "no" }
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "auth": {"profiles": {"openai:default": {"provider": "openai"}}},
        "models": {
            "providers": {
                "zeta": {"apiKey": "", "models": [{"id": "z-1"}]},
                "openai": {
                    "apiKey": "sk-test",
                    "models": [
                        {"id": "gpt-4o-mini", "input": ["text", "image"], "cost": {"input": 0.15, "output": 0.6}},
                        {"id": "o3", "cost": {"input": 2}}
                    ]
                },
                "anthropic": {"models": [{"id": "claude-3-haiku"}, {"name": "no id"}]}
            }
        }
    }"#;

    fn catalog() -> ProviderCatalog {
        ProviderCatalog::from_str(CATALOG).expect("should parse catalog")
    }

    #[test]
    fn test_providers_keep_document_order() {
        let catalog = catalog();
        let ids: Vec<&str> = catalog
            .providers()
            .iter()
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(ids, vec!["zeta", "openai", "anthropic"]);
    }

    #[test]
    fn test_flatten_tags_api_key_presence() {
        let seeds = catalog().flatten();
        assert_eq!(seeds.len(), 4);
        assert!(!seeds[0].has_api_key, "empty apiKey is not a credential");
        assert!(seeds[1].has_api_key);
        assert_eq!(seeds[1].model.input_cost, Some(0.15));
        assert_eq!(seeds[2].model.output_cost, None);
        assert!(!seeds[3].has_api_key);
    }

    #[test]
    fn test_models_without_id_are_skipped() {
        let catalog = catalog();
        let anthropic = &catalog.providers()[2].1;
        assert_eq!(anthropic.models.len(), 1);
    }

    #[test]
    fn test_deny_wins_over_prefer() {
        let policy = ProviderPolicy {
            prefer: vec!["anthropic".to_string()],
            deny: vec!["anthropic".to_string()],
            ..Default::default()
        };
        let seeds = catalog().candidates(Some(&policy), false);
        assert!(seeds.iter().all(|s| s.provider_id != "anthropic"));
    }

    #[test]
    fn test_allow_narrows_to_listed_providers() {
        let policy = ProviderPolicy {
            allow: vec![" openai ".to_string()],
            ..Default::default()
        };
        let seeds = catalog().candidates(Some(&policy), false);
        assert_eq!(seeds.len(), 2);
        assert!(seeds.iter().all(|s| s.provider_id == "openai"));
    }

    #[test]
    fn test_deny_checked_before_allow() {
        let policy = ProviderPolicy {
            allow: vec!["openai".to_string()],
            deny: vec!["openai".to_string()],
            ..Default::default()
        };
        assert!(catalog().candidates(Some(&policy), false).is_empty());
    }

    #[test]
    fn test_blank_policy_names_are_ignored() {
        let policy = ProviderPolicy {
            allow: vec!["  ".to_string()],
            ..Default::default()
        };
        assert_eq!(catalog().candidates(Some(&policy), false).len(), 4);
    }

    #[test]
    fn test_multimodal_filter_requires_image_input() {
        let seeds = catalog().candidates(None, true);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].model.id, "gpt-4o-mini");
    }

    #[test]
    fn test_blank_catalog_is_empty() {
        let catalog = ProviderCatalog::from_str("   ").expect("blank catalog is valid");
        assert!(catalog.flatten().is_empty());
    }

    #[test]
    fn test_malformed_catalog_is_an_error() {
        let result = ProviderCatalog::from_str("{not json");
        assert!(matches!(result, Err(AppError::CatalogParseFailed { .. })));
    }

    #[test]
    fn test_missing_catalog_file_is_empty() {
        let catalog = ProviderCatalog::from_file("/definitely/not/here/openclaw.json")
            .expect("missing file is an empty catalog");
        assert!(catalog.providers().is_empty());
    }

    #[test]
    fn test_snapshot_sorted_and_formatted() {
        let snapshot = ingest_snapshot(&catalog());
        assert_eq!(snapshot.auth_profile_count, 1);
        let ids: Vec<&str> = snapshot.providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["anthropic", "openai", "zeta"]);

        let text = format_snapshot(&snapshot);
        assert!(text.starts_with("KeyRouter Ingest Report"));
        assert!(text.contains("  - openai: models=2, apiKey=yes"));
        assert!(text.contains("  - zeta: models=1, apiKey=no"));
    }

    #[test]
    fn test_snapshot_counts_models_without_id() {
        let snapshot = ingest_snapshot(&catalog());
        let anthropic = &snapshot.providers[0];
        assert_eq!(anthropic.id, "anthropic");
        assert_eq!(anthropic.model_count, 2);
    }

    #[test]
    fn test_wrongly_typed_sections_are_ignored() {
        let catalog = ProviderCatalog::from_str(
            r#"{"auth": {"profiles": []}, "models": {"providers": {"openai": {"models": [{"id": "o3"}]}}}}"#,
        )
        .expect("bad auth section should not fail the catalog");
        assert_eq!(catalog.auth_profile_count(), 0);
        assert_eq!(catalog.flatten().len(), 1);

        let catalog = ProviderCatalog::from_str(r#"{"auth": {"profiles": {"x": {}}}, "models": []}"#)
            .expect("bad models section should not fail the catalog");
        assert_eq!(catalog.auth_profile_count(), 1);
        assert!(catalog.providers().is_empty());

        let catalog = ProviderCatalog::from_str("[]").expect("non-object root is empty");
        assert!(catalog.providers().is_empty());
    }
}
