use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use annotate::RateLimiter;

/// Environment variable holding the serving-time credential.
pub const CREDENTIAL_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub model: String,
    /// Minimum model confidence kept in results
    pub threshold: f32,
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    pub max_entity_types: usize,
    pub rate_limit: RateLimitConfig,
    /// 0 disables the response cache
    pub cache_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: annotate::GeminiClient::DEFAULT_MODEL.to_string(),
            threshold: 0.5,
            min_text_chars: 30,
            max_text_chars: 5000,
            max_entity_types: 12,
            rate_limit: RateLimitConfig {
                max_requests: 15,
                window_secs: 60,
            },
            cache_entries: 1024,
        }
    }
}

impl InferenceConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&content).context(format!("Failed to parse config: {:?}", path))
    }

    pub fn rate_limiter(&self) -> Result<RateLimiter> {
        RateLimiter::new(
            self.rate_limit.max_requests,
            Duration::from_secs(self.rate_limit.window_secs),
        )
    }
}

pub fn credential_from_env() -> Result<String> {
    let key = std::env::var(CREDENTIAL_ENV)
        .context(format!("{} environment variable is required", CREDENTIAL_ENV))?;
    if key.trim().is_empty() {
        anyhow::bail!("{} is empty", CREDENTIAL_ENV);
    }
    Ok(key.trim().to_string())
}
