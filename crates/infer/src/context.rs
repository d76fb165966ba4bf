use anyhow::Result;
use std::sync::Arc;

use annotate::{GeminiClient, TextGenerator};

use crate::config::{self, InferenceConfig};
use crate::fallback::LlmEntityPredictor;

/// Process-wide services, built once at start-up and passed to whatever needs
/// them.
pub struct AppContext {
    predictor: Arc<LlmEntityPredictor>,
}

impl AppContext {
    pub fn new(config: InferenceConfig, client: Arc<dyn TextGenerator>) -> Result<Self> {
        let limiter = Arc::new(config.rate_limiter()?);
        tracing::info!(
            model = %config.model,
            max_requests = config.rate_limit.max_requests,
            window_secs = config.rate_limit.window_secs,
            "Inference context ready"
        );

        Ok(Self {
            predictor: Arc::new(LlmEntityPredictor::new(client, limiter, config)),
        })
    }

    /// Build the context with a Gemini client keyed from the environment.
    pub fn from_env(config: InferenceConfig) -> Result<Self> {
        let key = config::credential_from_env()?;
        let client: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(config.model.clone(), key));
        Self::new(config, client)
    }

    pub fn predictor(&self) -> Arc<LlmEntityPredictor> {
        self.predictor.clone()
    }

    pub fn config(&self) -> &InferenceConfig {
        self.predictor.config()
    }
}
