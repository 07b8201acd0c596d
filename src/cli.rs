//! Command-line interface for KeyRouter
//!
//! Provides argument parsing and subcommand handling for the KeyRouter binary.

use clap::{Parser, Subcommand};

/// Bring-your-own-key model router
#[derive(Parser)]
#[command(name = "keyrouter")]
#[command(version)]
#[command(about = "Bring-your-own-key model router")]
#[command(
    long_about = "KeyRouter scores the models configured in your provider catalog against \
    each request, advises on retries after provider errors, and tracks usage, quota and \
    cooldowns. Without a subcommand it starts the hook server."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = crate::config::DEFAULT_CONFIG_PATH, global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Whether `--config` was left at its default
    pub fn uses_default_config(&self) -> bool {
        self.config == crate::config::DEFAULT_CONFIG_PATH
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize auth profiles and providers from the catalog
    Audit,

    /// Route a prompt or a JSON request and print the ranked candidates
    Route {
        /// Plain text prompt, or a JSON message/array of messages
        input: String,
    },

    /// Classify a provider error and print the retry recommendation
    Retry {
        /// Error message returned by the provider
        error: String,
    },

    /// Print per-model usage totals
    Usage,

    /// Print the quota and cooldown table
    Quota,

    /// Overwrite the quota entry for a model
    QuotaSet {
        /// Model key as provider/model
        model_key: String,
        /// Remaining quota (any finite number)
        remaining: String,
        /// Reset time (RFC 3339)
        reset_at: Option<String>,
    },

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run the HTTP hook server
    Serve,
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# KeyRouter Configuration
# ========================
#
# Every section is optional; the values below are the defaults.

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING
# ─────────────────────────────────────────────────────────────────────────────

[routing]
# Master switch for hook routing. When false, hooks answer with no override;
# route/retry commands keep working for diagnostics.
enabled = true

# Attempt budget used by retry advice (1-10)
max_attempts = 3

# Skip models whose cooldown (set by retry advice) has not expired yet
honor_cooldowns = false

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDER POLICY
# ─────────────────────────────────────────────────────────────────────────────
#
# Provider ids as they appear in the catalog. Deny wins over allow; an empty
# allow list allows every provider. Preferred providers get a score bonus.

[providers]
allow = []
prefer = []
deny = []

# ─────────────────────────────────────────────────────────────────────────────
# HARD APPLY
# ─────────────────────────────────────────────────────────────────────────────

[hard_apply]
# Return routing decisions to the host instead of only recording them
enabled = false

# "off", "override" (answer hooks with provider/model overrides) or
# "pin" (write the decision into the host catalog and session files)
mode = "override"

# Pin target in the catalog: "agent" (agents.list[id].model) or
# "defaults" (agents.defaults.model)
pin_scope = "agent"

# Seconds a pending session pin survives without agent_end (1-86400)
pin_ttl_seconds = 3600

# ─────────────────────────────────────────────────────────────────────────────
# PATHS
# ─────────────────────────────────────────────────────────────────────────────

[paths]
# Host configuration holding auth profiles and model providers
catalog = "~/.openclaw/openclaw.json"

# Persisted usage events, quota and cooldowns
state = "~/.openclaw/keyrouter/state.json"

# Host agent directories; pin mode updates <agents>/<id>/sessions/sessions.json
agents = "~/.openclaw/agents"

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
host = "127.0.0.1"
port = 7341

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"
"#
}
