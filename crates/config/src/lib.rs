//! Configuration loading, validation, and management for Conclave.
//!
//! Loads configuration from `~/.conclave/config.toml` (or the path in
//! `CONCLAVE_CONFIG`) with environment variable overrides. Agent and network
//! definitions are read here once at startup; there is no hot reload.

use conclave_core::agent::{AgentConfig, ModelParams, ValidationPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.conclave/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fallback API key for providers without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider used by networks that do not name one
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used by networks that do not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Agent definitions
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Network (router) definitions
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("gateway", &self.gateway)
            .field("runtime", &self.runtime)
            .field("memory", &self.memory)
            .field("providers", &self.providers)
            .field("agents", &self.agents.len())
            .field("networks", &self.networks.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Allowed CORS origins; empty means same-origin only
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    4111
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: vec![],
        }
    }
}

/// Limits applied to every agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Timeout for a single model call
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    /// Timeout for a single tool call. Delegation to a network's roster agents
    /// is bounded by their own model timeouts instead.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Maximum model turns (tool-call rounds) per generation attempt
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// How many prior thread messages an agent sees
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_model_timeout() -> u64 {
    60
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_max_tool_iterations() -> u32 {
    10
}
fn default_history_limit() -> usize {
    20
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_timeout_secs: default_model_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            max_tool_iterations: default_max_tool_iterations(),
            history_limit: default_history_limit(),
        }
    }
}

/// Where memory threads are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "memory" (ephemeral) or "file" (JSONL on disk)
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Path for the file backend; defaults to `~/.conclave/threads.jsonl`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_memory_backend() -> String {
    "memory".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
        }
    }
}

impl MemoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("threads.jsonl"))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable to read the key from (overrides the conventional name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_key_env", &self.api_key_env)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// A network: a fixed roster of agents behind a routing model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,

    /// Routing guidance shown to the model in addition to the roster list
    #[serde(default)]
    pub instructions: String,

    /// Roster agent ids, in order
    pub agents: Vec<String>,

    /// Routing model; defaults to the app-level provider and model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelParams>,

    /// "none" or "scoring"
    #[serde(default = "default_fallback")]
    pub fallback: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_validation: Option<ValidationPolicy>,
}

fn default_fallback() -> String {
    "none".into()
}

impl AppConfig {
    /// Load configuration from `CONCLAVE_CONFIG` or the default path.
    ///
    /// Environment overrides:
    /// - `CONCLAVE_API_KEY` (when no key is configured)
    /// - `CONCLAVE_PROVIDER`, `CONCLAVE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("CONCLAVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("CONCLAVE_API_KEY").ok();
        }

        if let Ok(provider) = std::env::var("CONCLAVE_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("CONCLAVE_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".conclave")
    }

    /// Validate settings that would make the whole process unusable.
    ///
    /// Individual agent problems (empty fields, missing tools, duplicate ids)
    /// are left to the agent factory so one bad agent does not block the rest.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.runtime.model_timeout_secs == 0 || self.runtime.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "runtime timeouts must be greater than zero".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory backend '{}', expected 'memory' or 'file'",
                self.memory.backend
            )));
        }

        let mut names = HashSet::new();
        for network in &self.networks {
            if network.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "network name must not be empty".into(),
                ));
            }
            if !names.insert(network.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate network name '{}'",
                    network.name
                )));
            }
            if !matches!(network.fallback.as_str(), "none" | "scoring") {
                return Err(ConfigError::ValidationError(format!(
                    "network '{}': fallback must be 'none' or 'scoring'",
                    network.name
                )));
            }
        }

        Ok(())
    }

    /// The routing model for a network: its own, or the app defaults.
    pub fn network_model(&self, network: &NetworkConfig) -> ModelParams {
        network.model.clone().unwrap_or_else(|| ModelParams {
            provider: self.default_provider.clone(),
            model: self.default_model.clone(),
            temperature: self.default_temperature,
            max_tokens: Some(self.default_max_tokens),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            gateway: GatewayConfig::default(),
            runtime: RuntimeConfig::default(),
            memory: MemoryConfig::default(),
            providers: HashMap::new(),
            agents: vec![],
            networks: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_provider = "openai"

[runtime]
model_timeout_secs = 15

[providers.openai]
api_key_env = "MY_OPENAI_KEY"

[[agents]]
id = "researcher"
name = "Researcher"
instructions = "Find facts."
description = "Searches the web for current information"
tools = ["web-search"]

[agents.response_validation]
max_attempts = 2

[[agents]]
id = "writer"
name = "Writer"
instructions = "Write clearly."

[[networks]]
name = "content"
instructions = "Research first, then write."
agents = ["researcher", "writer"]
fallback = "scoring"
"#;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.gateway.port, 4111);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_agents_and_networks() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].tools, vec!["web-search"]);
        assert_eq!(
            config.agents[0].response_validation.map(|p| p.max_attempts),
            Some(2)
        );
        assert_eq!(config.networks[0].agents, vec!["researcher", "writer"]);
        assert_eq!(config.runtime.model_timeout_secs, 15);
        assert_eq!(config.runtime.tool_timeout_secs, 30);
        assert_eq!(
            config.providers["openai"].api_key_env.as_deref(),
            Some("MY_OPENAI_KEY")
        );
    }

    #[test]
    fn network_model_falls_back_to_defaults() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let params = config.network_model(&config.networks[0]);
        assert_eq!(params.provider, "openai");
        assert_eq!(params.model, "gpt-4o-mini");
        assert_eq!(params.max_tokens, Some(4096));
    }

    #[test]
    fn duplicate_network_rejected() {
        let toml_str = r#"
[[networks]]
name = "a"
agents = []

[[networks]]
name = "a"
agents = []
"#;
        assert!(matches!(
            AppConfig::from_toml(toml_str),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn unknown_fallback_rejected() {
        let toml_str = r#"
[[networks]]
name = "a"
agents = []
fallback = "dice"
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.networks.len(), 1);
    }

    #[test]
    fn parse_error_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "agents = 3").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn debug_redacts_keys() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
