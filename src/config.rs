//! Configuration management for KeyRouter
//!
//! Parses `keyrouter.toml` and provides typed access to settings. Every
//! section is optional; an empty file is a valid configuration.

use crate::catalog::ProviderPolicy;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default configuration file name, resolved against the working directory
pub const DEFAULT_CONFIG_PATH: &str = "keyrouter.toml";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Provider allow/prefer/deny policy applied to every routing call
    #[serde(default)]
    pub providers: ProviderPolicy,
    #[serde(default)]
    pub hard_apply: HardApplyConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Routing configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Kill switch for hook-driven auto-routing
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Attempt budget handed to the retry advisor
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Drop candidates whose cooldown is still running before scoring
    #[serde(default)]
    pub honor_cooldowns: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_attempts: default_max_attempts(),
            honor_cooldowns: false,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    crate::retry::DEFAULT_MAX_ATTEMPTS
}

/// How a routing decision is applied by hook callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HardApplyMode {
    Off,
    #[default]
    Override,
    Pin,
}

/// Where pin mode writes the primary model in the host catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinScope {
    #[default]
    Agent,
    Defaults,
}

impl PinScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Defaults => "defaults",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HardApplyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: HardApplyMode,
    #[serde(default)]
    pub pin_scope: PinScope,
    /// How long a pending session pin survives without `agent_end`
    #[serde(default = "default_pin_ttl")]
    pub pin_ttl_seconds: u64,
}

impl Default for HardApplyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: HardApplyMode::default(),
            pin_scope: PinScope::default(),
            pin_ttl_seconds: default_pin_ttl(),
        }
    }
}

impl HardApplyConfig {
    /// Hard-apply is on and set to `mode`
    pub fn is_active(&self, mode: HardApplyMode) -> bool {
        self.enabled && self.mode == mode
    }

    pub fn pin_ttl(&self) -> Duration {
        Duration::from_secs(self.pin_ttl_seconds)
    }
}

fn default_pin_ttl() -> u64 {
    3600
}

/// File locations; a leading `~/` expands to the home directory
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PathsConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog: String,
    #[serde(default = "default_state_path")]
    pub state: String,
    /// Host agent directories holding `<id>/sessions/sessions.json`
    #[serde(default = "default_agents_path")]
    pub agents: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog_path(),
            state: default_state_path(),
            agents: default_agents_path(),
        }
    }
}

impl PathsConfig {
    pub fn catalog_path(&self) -> PathBuf {
        expand_home(&self.catalog)
    }

    pub fn state_path(&self) -> PathBuf {
        expand_home(&self.state)
    }

    pub fn agents_path(&self) -> PathBuf {
        expand_home(&self.agents)
    }
}

fn default_catalog_path() -> String {
    "~/.openclaw/openclaw.json".to_string()
}

fn default_state_path() -> String {
    "~/.openclaw/keyrouter/state.json".to_string()
}

fn default_agents_path() -> String {
    "~/.openclaw/agents".to_string()
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7341
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Expand a leading `~/` using the current user's home directory
///
/// Paths are returned unchanged when no home directory can be determined.
pub fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if raw == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(raw)
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML
        let config: Self = toml::from_str(&content).map_err(|source| {
            AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 3: Validate
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Like [`Config::from_file`], but a missing file yields defaults
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if !path.as_ref().exists() {
            tracing::debug!(
                path = %path.as_ref().display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Check ranges and enumerated values
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=10).contains(&self.routing.max_attempts) {
            return Err(AppError::Config(format!(
                "routing.max_attempts must be between 1 and 10, got {}",
                self.routing.max_attempts
            )));
        }

        if !(1..=86_400).contains(&self.hard_apply.pin_ttl_seconds) {
            return Err(AppError::Config(format!(
                "hard_apply.pin_ttl_seconds must be between 1 and 86400, got {}",
                self.hard_apply.pin_ttl_seconds
            )));
        }

        if self.server.port == 0 {
            return Err(AppError::Config(
                "server.port must be non-zero".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.observability.log_level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level must be one of {}, got '{}'",
                LOG_LEVELS.join("/"),
                self.observability.log_level
            )));
        }

        for (name, path) in [
            ("catalog", &self.paths.catalog),
            ("state", &self.paths.state),
            ("agents", &self.paths.agents),
        ] {
            if path.trim().is_empty() {
                return Err(AppError::Config(format!("paths.{name} must not be empty")));
            }
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
