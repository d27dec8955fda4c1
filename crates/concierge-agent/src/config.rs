use concierge_core::{ConciergeError, ConciergeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Supported completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Messages API.
    Claude,
    /// OpenAI chat completions.
    OpenAi,
    /// OpenRouter, OpenAI-compatible.
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible.
    Groq,
}

impl ProviderKind {
    /// Lowercase identifier as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Groq => "groq",
        }
    }
}

/// One entry of the `[[providers]]` list. List order is fallback priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Which backend to talk to.
    pub provider: ProviderKind,
    /// Model identifier passed to the backend.
    pub model_id: String,
    /// Inline key. Takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: String,
    /// Environment variable holding the key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Overrides the backend's default endpoint.
    pub api_base_url: Option<String>,
    /// Name in logs and attempt reports; defaults to `provider:model_id`.
    #[serde(default)]
    pub name: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion length cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}

impl ProviderConfig {
    /// A config with defaults for everything but kind, model and key.
    pub fn new(provider: ProviderKind, model_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            api_key: api_key.into(),
            api_key_env: None,
            api_base_url: None,
            name: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Endpoint root without a trailing slash.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                ProviderKind::Claude => "https://api.anthropic.com",
                ProviderKind::OpenAi => "https://api.openai.com",
                ProviderKind::OpenRouter => "https://openrouter.ai/api",
                ProviderKind::Groq => "https://api.groq.com/openai",
            }
        }
    }

    /// Name used in logs and attempt reports.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}:{}", self.provider.as_str(), self.model_id),
        }
    }

    /// [`Self::timeout_secs`] as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The API key, read from `api_key_env` when no inline key is set.
    pub fn resolve_api_key(&self) -> ConciergeResult<String> {
        if !self.api_key.is_empty() {
            return Ok(self.api_key.clone());
        }
        match &self.api_key_env {
            Some(var) => std::env::var(var).map_err(|_| {
                ConciergeError::Config(format!(
                    "provider '{}': environment variable {var} is not set",
                    self.display_name()
                ))
            }),
            None => Err(ConciergeError::Config(format!(
                "provider '{}': neither api_key nor api_key_env is set",
                self.display_name()
            ))),
        }
    }
}
