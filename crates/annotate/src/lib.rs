pub mod aligner;
pub mod llm;
pub mod normalizer;
pub mod parser;
pub mod prompt;
pub mod rate_limiter;
pub mod retry;
pub mod schema;
pub mod tokenizer;

pub use aligner::SpanAligner;
pub use llm::{GeminiClient, OllamaClient, RejectedRequest, TextGenerator};
pub use normalizer::LabelNormalizer;
pub use parser::ParseError;
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use schema::{AnnotatedExample, EntityMention, GenerationRecord, RecognizedEntity, SpanAnnotation};
pub use tokenizer::{Tokenizer, WordTokenizer};

use std::sync::Arc;
use thiserror::Error;

/// Everything produced for one passage: the raw completion, its parsed
/// structure, and the span-aligned training example.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub completion: String,
    pub record: GenerationRecord,
    pub example: AnnotatedExample,
}

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),

    #[error("unusable response: {source}")]
    Parse {
        completion: String,
        #[source]
        source: ParseError,
    },
}

/// Turns passages into annotated examples through an external generator.
pub struct Annotator<T: Tokenizer = WordTokenizer> {
    client: Arc<dyn TextGenerator>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    aligner: SpanAligner<T>,
    entity_types: Vec<String>,
}

impl Annotator<WordTokenizer> {
    pub fn new(client: Arc<dyn TextGenerator>, limiter: Arc<RateLimiter>) -> Self {
        Self::with_aligner(client, limiter, SpanAligner::default())
    }
}

impl<T: Tokenizer> Annotator<T> {
    pub fn with_aligner(
        client: Arc<dyn TextGenerator>,
        limiter: Arc<RateLimiter>,
        aligner: SpanAligner<T>,
    ) -> Self {
        Self {
            client,
            limiter,
            retry: RetryPolicy::none(),
            aligner,
            entity_types: Vec::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Type hints forwarded to the prompt.
    pub fn with_entity_types(mut self, entity_types: Vec<String>) -> Self {
        self.entity_types = entity_types;
        self
    }

    /// Call the generator for `text`. Every attempt goes through the rate limiter.
    pub async fn complete(&self, text: &str) -> anyhow::Result<String> {
        let prompt = prompt::build_annotation_prompt(text, &self.entity_types);
        let prompt = prompt.as_str();
        let client = self.client.as_ref();
        let limiter = self.limiter.as_ref();

        self.retry
            .retry_if(
                "generate_annotations",
                || async move {
                    limiter.acquire().await;
                    client.generate(prompt).await
                },
                llm::is_retryable,
            )
            .await
    }

    /// Parse a completion and align its mentions against `text`.
    pub fn interpret(
        &self,
        text: &str,
        completion: &str,
    ) -> Result<(GenerationRecord, AnnotatedExample), ParseError> {
        let record = parser::parse_annotation_response(completion, text)?;
        let example = self
            .aligner
            .align(text, &record.entities, &record.negative_entities);
        Ok((record, example))
    }

    /// Full pipeline for one passage: prompt, generate, parse, align.
    pub async fn annotate(&self, text: &str) -> Result<Annotation, AnnotateError> {
        let completion = self
            .complete(text)
            .await
            .map_err(AnnotateError::Generation)?;

        match self.interpret(text, &completion) {
            Ok((record, example)) => Ok(Annotation {
                completion,
                record,
                example,
            }),
            Err(source) => Err(AnnotateError::Parse { completion, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedGenerator {
        replies: Mutex<Vec<anyhow::Result<String>>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<anyhow::Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(100, Duration::from_secs(60)).unwrap())
    }

    #[tokio::test]
    async fn test_annotate_end_to_end() {
        let client = ScriptedGenerator::new(vec![Ok(r#"<start>{
            "entities": [{"entity": "the cat", "types": ["animal"]}],
            "negative_entities": [{"entity": "sat", "types": ["animal"]}]
        }<end>"#
            .to_string())]);
        let annotator = Annotator::new(client, limiter());

        let annotation = annotator.annotate("The cat sat. The cat sat.").await.unwrap();
        assert_eq!(annotation.example.positive_spans.len(), 2);
        assert_eq!(annotation.example.negatives().len(), 2);
        assert_eq!(annotation.record.entities[0].text, "the cat");
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_completion() {
        let client = ScriptedGenerator::new(vec![Ok("I cannot help with that.".to_string())]);
        let annotator = Annotator::new(client, limiter());

        match annotator.annotate("text").await {
            Err(AnnotateError::Parse { completion, source }) => {
                assert_eq!(completion, "I cannot help with that.");
                assert!(matches!(source, ParseError::NoPayload(_)));
            }
            other => panic!("unexpected result: {:?}", other.map(|a| a.completion)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_retried_through_limiter() {
        let client = ScriptedGenerator::new(vec![
            Err(anyhow::anyhow!("429")),
            Ok(r#"{"entities": []}"#.to_string()),
        ]);
        let limiter = limiter();
        let annotator = Annotator::new(client, limiter.clone()).with_retry(RetryPolicy::new(1, 10, 10));

        let annotation = annotator.annotate("text").await.unwrap();
        assert!(annotation.example.positive_spans.is_empty());
        assert_eq!(limiter.in_window().await, 2);
    }

    #[tokio::test]
    async fn test_generation_failure_surfaces() {
        let client = ScriptedGenerator::new(vec![Err(anyhow::anyhow!("timeout"))]);
        let annotator = Annotator::new(client, limiter());
        assert!(matches!(
            annotator.annotate("text").await,
            Err(AnnotateError::Generation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_not_retried() {
        let client = ScriptedGenerator::new(vec![
            Err(RejectedRequest { status: 401 }.into()),
            Ok(r#"{"entities": []}"#.to_string()),
        ]);
        let limiter = limiter();
        let annotator = Annotator::new(client, limiter.clone()).with_retry(RetryPolicy::new(3, 10, 10));

        assert!(matches!(
            annotator.annotate("text").await,
            Err(AnnotateError::Generation(_))
        ));
        assert_eq!(limiter.in_window().await, 1);
    }
}
