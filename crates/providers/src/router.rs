//! Provider router — resolves an agent's `ModelParams` to a live provider.
//!
//! Providers are built once from configuration. A provider whose credentials
//! are missing is remembered as unavailable so that only the agents that
//! reference it fail to build.

use std::collections::HashMap;
use std::sync::Arc;

use conclave_config::AppConfig;
use conclave_core::agent::ModelParams;
use conclave_core::error::BuildError;
use conclave_core::provider::{ModelHandle, Provider};
use tracing::{debug, warn};

use crate::openai_compat::OpenAiCompatProvider;

/// Providers that run locally and need no API key.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "vllm", "llamacpp", "llama.cpp"];

/// Maps provider names to live providers.
#[derive(Default)]
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    unavailable: HashMap<String, String>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        self.unavailable.remove(&name);
        self.providers.insert(name, provider);
    }

    /// Record that a provider is configured but cannot be used.
    pub fn mark_unavailable(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.unavailable.insert(name.into(), reason.into());
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve model parameters to a handle the agent runtime can call.
    pub fn model_handle(&self, params: &ModelParams) -> Result<ModelHandle, BuildError> {
        if params.model.trim().is_empty() {
            return Err(BuildError::empty_field("model.model"));
        }

        match self.providers.get(&params.provider) {
            Some(provider) => Ok(ModelHandle {
                provider: provider.clone(),
                model: params.model.clone(),
                temperature: params.temperature,
                max_tokens: params.max_tokens,
            }),
            None => Err(BuildError::ProviderConfiguration {
                provider: params.provider.clone(),
                reason: self
                    .unavailable
                    .get(&params.provider)
                    .cloned()
                    .unwrap_or_else(|| "provider is not configured".into()),
            }),
        }
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration using the process environment.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    build_with_env(config, |key| std::env::var(key).ok())
}

/// Build providers from configuration with an explicit environment lookup.
///
/// Every provider named in `[providers]`, by an agent, by a network, or as
/// the default is considered. Keys resolve in order: the provider's own
/// `api_key`, its `api_key_env` variable, `<NAME>_API_KEY`, then the global
/// key.
pub fn build_with_env<F>(config: &AppConfig, env: F) -> ProviderRouter
where
    F: Fn(&str) -> Option<String>,
{
    let mut router = ProviderRouter::new();

    let mut names: Vec<String> = config.providers.keys().cloned().collect();
    names.push(config.default_provider.clone());
    names.extend(config.agents.iter().map(|a| a.model.provider.clone()));
    names.extend(
        config
            .networks
            .iter()
            .map(|n| config.network_model(n).provider),
    );
    names.sort();
    names.dedup();

    for name in names {
        let provider_config = config.providers.get(&name);

        let api_key = provider_config
            .and_then(|p| p.api_key.clone())
            .or_else(|| {
                provider_config
                    .and_then(|p| p.api_key_env.as_deref())
                    .and_then(&env)
            })
            .or_else(|| env(&format!("{}_API_KEY", env_prefix(&name))))
            .or_else(|| config.api_key.clone())
            .filter(|k| !k.trim().is_empty());

        let base_url = provider_config
            .and_then(|p| p.api_url.clone())
            .unwrap_or_else(|| default_base_url(&name));

        match api_key {
            Some(key) => {
                debug!(provider = %name, base_url = %base_url, "Provider configured");
                router.register(
                    name.clone(),
                    Arc::new(OpenAiCompatProvider::new(&name, &base_url, key)),
                );
            }
            None if KEYLESS_PROVIDERS.contains(&name.as_str()) => {
                debug!(provider = %name, base_url = %base_url, "Local provider configured");
                router.register(
                    name.clone(),
                    Arc::new(OpenAiCompatProvider::new(&name, &base_url, "")),
                );
            }
            None => {
                warn!(provider = %name, "No API key found; agents using this provider will not be built");
                router.mark_unavailable(
                    name.clone(),
                    format!("no API key (set {}_API_KEY)", env_prefix(&name)),
                );
            }
        }
    }

    router
}

fn env_prefix(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "mistral" => "https://api.mistral.ai/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
