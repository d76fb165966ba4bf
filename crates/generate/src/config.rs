use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use annotate::{GeminiClient, OllamaClient, RateLimiter, RetryPolicy, TextGenerator};
use std::sync::Arc;

use crate::generator::ClientFactory;
use corpus::PartitionConfig;

/// Environment variable holding comma-separated generation credentials.
pub const CREDENTIALS_ENV: &str = "GEMINI_API_KEYS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: Provider,
    pub model: String,
    /// Passages per chunk (one worker per chunk)
    pub chunk_size: usize,
    /// Passages taken from the shuffled corpus
    pub dataset_size: usize,
    pub seed: Option<u64>,
    /// Optional type hints for the prompt
    pub entity_types: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub throttle: ThrottleConfig,
    pub retry: RetryConfig,
}

/// Which text-generation backend annotates the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Provider {
    /// Hosted Gemini; one credential per worker from the environment
    Gemini,
    /// Local Ollama server; a single worker, no credentials
    Ollama { base_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

/// Coarse pause on top of the rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Pause after this many calls; 0 disables
    pub every: usize,
    pub pause_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::free_tier()
    }
}

impl GenerationConfig {
    /// Limits of the free generation tier: 15 requests per minute per key.
    pub fn free_tier() -> Self {
        Self {
            provider: Provider::Gemini,
            model: GeminiClient::DEFAULT_MODEL.to_string(),
            chunk_size: 500,
            dataset_size: 3000,
            seed: Some(42),
            entity_types: Vec::new(),
            rate_limit: RateLimitConfig {
                max_requests: 15,
                window_secs: 60,
            },
            throttle: ThrottleConfig {
                every: 15,
                pause_secs: 60,
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
            },
        }
    }

    pub fn paid_tier() -> Self {
        Self {
            rate_limit: RateLimitConfig {
                max_requests: 1000,
                window_secs: 60,
            },
            throttle: ThrottleConfig {
                every: 0,
                pause_secs: 0,
            },
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            ..Self::free_tier()
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&content).context(format!("Failed to parse config: {:?}", path))
    }

    pub fn partition_config(&self) -> PartitionConfig {
        PartitionConfig {
            chunk_size: self.chunk_size,
            max_passages: self.dataset_size,
            seed: self.seed,
        }
    }

    pub fn rate_limiter(&self) -> Result<RateLimiter> {
        RateLimiter::new(
            self.rate_limit.max_requests,
            Duration::from_secs(self.rate_limit.window_secs),
        )
    }

    /// Credentials for the configured provider.
    pub fn credentials(&self) -> Result<Vec<String>> {
        match self.provider {
            Provider::Gemini => credentials_from_env(),
            Provider::Ollama { .. } => Ok(vec!["local".to_string()]),
        }
    }

    pub fn client_factory(&self) -> ClientFactory {
        let model = self.model.clone();
        match &self.provider {
            Provider::Gemini => Arc::new(move |key: &str| -> Arc<dyn TextGenerator> {
                Arc::new(GeminiClient::new(model.clone(), key.to_string()))
            }),
            Provider::Ollama { base_url } => {
                let base_url = base_url.clone();
                Arc::new(move |_: &str| -> Arc<dyn TextGenerator> {
                    Arc::new(OllamaClient::new(base_url.clone(), model.clone()))
                })
            }
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms,
        )
    }
}

/// Split a comma-separated credential list, dropping blanks.
pub fn parse_credentials(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|key| key.trim())
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn credentials_from_env() -> Result<Vec<String>> {
    let raw = std::env::var(CREDENTIALS_ENV)
        .context(format!("{} environment variable is required", CREDENTIALS_ENV))?;
    let keys = parse_credentials(&raw);
    if keys.is_empty() {
        anyhow::bail!("{} contains no credentials", CREDENTIALS_ENV);
    }
    Ok(keys)
}
