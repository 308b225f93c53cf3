use crate::error::{WilsonError, WilsonResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for the orchestration core.
///
/// Loading from disk is the embedder's job; these structs only define the
/// schema (toml-compatible) and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WilsonConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Per-purpose LLM settings, keyed by purpose name
    /// (`chat`, `orchestration`, `planning`, `analysis`, `code`, `vision`).
    #[serde(default)]
    pub llms: HashMap<String, LlmSettings>,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default = "default_workspace_path")]
    pub workspace_path: String,
    #[serde(default)]
    pub mcp: McpConfig,
}

impl WilsonConfig {
    pub fn from_toml_str(s: &str) -> WilsonResult<Self> {
        toml::from_str(s).map_err(|e| WilsonError::Config(e.to_string()))
    }
}

/// Settings for one registered LLM purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Purpose to fall back to when this one is unavailable.
    pub fallback: Option<String>,
    /// Pinned models are never evicted by idle timeout or the sweeper.
    #[serde(default)]
    pub keep_alive: bool,
    /// Seconds of idleness before a non-pinned instance unloads.
    /// 0 unloads immediately on last release.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Provider-specific options passed through to the request.
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

impl LlmSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            model: model.into(),
            temperature: default_temperature(),
            base_url: None,
            api_key: None,
            fallback: None,
            keep_alive: false,
            idle_timeout: default_idle_timeout(),
            options: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_true")]
    pub auto_store: bool,
    #[serde(default = "default_context_name")]
    pub default_context: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            auto_store: true,
            default_context: default_context_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_path")]
    pub path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_audit_path(),
        }
    }
}

/// MCP server table. Carried as configuration only — no client ships with
/// the core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_workspace_path() -> String {
    ".".to_string()
}

fn default_db_path() -> String {
    "wilson.db".to_string()
}

fn default_context_name() -> String {
    "default".to_string()
}

fn default_audit_path() -> String {
    "audit.jsonl".to_string()
}

fn default_true() -> bool {
    true
}
