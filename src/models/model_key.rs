//! Type-safe model key wrapper
//!
//! Identifies one candidate as `"providerId/modelId"`. Used as the key of the
//! quota table and in exclusion sets for cooldown-aware routing.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// `"providerId/modelId"` key
///
/// # Construction
/// - `ModelKey::new(provider, model)`: always well-formed
/// - `ModelKey::parse(raw)`: validates user input (management operations)
/// - Deserialization: no validation, so keys written by older versions or
///   edited by hand still load
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelKey(String);

impl ModelKey {
    pub fn new(provider_id: &str, model_id: &str) -> Self {
        Self(format!("{provider_id}/{model_id}"))
    }

    /// Parse a user-supplied key
    ///
    /// # Errors
    /// Returns a validation error naming the value when it is not of the form
    /// `provider/model` with both halves non-empty. Model ids may themselves
    /// contain `/`; the provider id is everything before the first one.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let raw = raw.trim();
        match raw.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok(Self(raw.to_string()))
            }
            _ => Err(AppError::Validation(format!(
                "Invalid model key '{raw}': expected <provider>/<model>"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn provider_id(&self) -> &str {
        self.0.split_once('/').map(|(p, _)| p).unwrap_or(&self.0)
    }

    pub fn model_id(&self) -> &str {
        self.0.split_once('/').map(|(_, m)| m).unwrap_or("")
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelKey {
    /// Unvalidated conversion, prefer `ModelKey::parse` for user input
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Model keys to remove from candidate lists before scoring
pub type ExclusionSet = HashSet<ModelKey>;
