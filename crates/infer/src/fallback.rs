use std::sync::Arc;
use tracing::{debug, warn};

use annotate::{RateLimiter, TextGenerator, parser, prompt};

use crate::cache::ResponseCache;
use crate::config::InferenceConfig;
use crate::labels::{self, InputError};
use crate::reconciler::{ReconciledEntity, reconcile};

/// Serving-time entity recognition through a text-generation service.
///
/// Input problems are reported as [`InputError`]; upstream problems never
/// are. A failed call, an unusable response, or anything else outside our
/// control yields an empty entity list.
pub struct LlmEntityPredictor {
    client: Arc<dyn TextGenerator>,
    limiter: Arc<RateLimiter>,
    cache: ResponseCache,
    config: InferenceConfig,
}

impl LlmEntityPredictor {
    pub fn new(client: Arc<dyn TextGenerator>, limiter: Arc<RateLimiter>, config: InferenceConfig) -> Self {
        Self {
            client,
            limiter,
            cache: ResponseCache::new(config.cache_entries),
            config,
        }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Validate raw request input, then predict.
    pub async fn predict(&self, text: &str, raw_types: &str) -> Result<Vec<ReconciledEntity>, InputError> {
        let text = labels::validate_text(text, self.config.min_text_chars, self.config.max_text_chars)?;
        let types = labels::parse_entity_types(raw_types, self.config.max_entity_types)?;
        Ok(self.predict_validated(text, &types).await)
    }

    /// Predict for input that already passed validation.
    pub async fn predict_validated(&self, text: &str, types: &[String]) -> Vec<ReconciledEntity> {
        let key = ResponseCache::key(text, types, self.config.threshold);
        if let Some(hit) = self.cache.get(&key) {
            debug!(entities = hit.len(), "Prediction served from cache");
            return hit;
        }

        self.limiter.acquire().await;

        let completion = match self.client.generate(&prompt::build_recognition_prompt(text, types)).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Recognition call failed, returning no entities");
                return Vec::new();
            }
        };

        let recognized = match parser::parse_recognition_response(&completion) {
            Ok(recognized) => recognized,
            Err(e) => {
                warn!(error = %e, "Unusable recognition response, returning no entities");
                return Vec::new();
            }
        };

        let kept: Vec<_> = recognized
            .into_iter()
            .filter(|e| e.score >= self.config.threshold)
            .collect();
        let entities = reconcile(text, &kept);

        debug!(kept = kept.len(), placed = entities.len(), "Prediction complete");
        self.cache.insert(key, entities.clone());
        entities
    }
}
