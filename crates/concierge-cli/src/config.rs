use concierge_agent::ProviderConfig;
use concierge_security::RateLimitConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Contents of `concierge.toml`.
#[derive(Debug, Deserialize)]
pub struct ConciergeConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Fallback order is the order of the entries.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Deadline for one whole reply.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_max_history() -> usize {
    20
}

impl ConciergeConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: ConciergeConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not need network access. API keys are resolved
    /// later, when providers are built.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one [[providers]] entry is required");
        }
        if self.max_history == 0 {
            anyhow::bail!("max_history must be at least 1");
        }
        if self.request_timeout_secs == Some(0) {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        for provider in &self.providers {
            if provider.model_id.trim().is_empty() {
                anyhow::bail!("provider '{}' has an empty model_id", provider.provider.as_str());
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
