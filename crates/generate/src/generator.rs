use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use annotate::{AnnotateError, AnnotatedExample, Annotator, GenerationRecord, RateLimiter, TextGenerator};
use corpus::CorpusChunk;

use crate::artifacts::JsonArtifactStore;
use crate::config::{GenerationConfig, ThrottleConfig};

/// Builds a generation client for one credential.
pub type ClientFactory = Arc<dyn Fn(&str) -> Arc<dyn TextGenerator> + Send + Sync>;

/// A completion exactly as returned, kept for auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    pub passage_index: usize,
    pub text: String,
    pub completion: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkReport {
    pub chunk_index: usize,
    pub chunk_id: String,
    pub attempted: usize,
    pub generated: usize,
    pub generation_failures: usize,
    pub parse_failures: usize,
    pub examples: usize,
    pub positive_spans: usize,
    pub negative_spans: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub chunks: Vec<ChunkReport>,
    pub examples: usize,
    pub skipped: usize,
    /// Chunks whose worker failed; none of their output is merged
    pub failed_chunks: Vec<usize>,
}

/// `raw`, `parsed` and `examples` are index-aligned. Completions that could
/// not be parsed go to `unparsed` instead.
struct ChunkOutput {
    report: ChunkReport,
    raw: Vec<RawResponse>,
    parsed: Vec<GenerationRecord>,
    examples: Vec<AnnotatedExample>,
    unparsed: Vec<RawResponse>,
}

/// One credential's client and request budget, shared by every chunk
/// assigned to that credential.
#[derive(Clone)]
struct CredentialLane {
    client: Arc<dyn TextGenerator>,
    limiter: Arc<RateLimiter>,
}

/// Runs annotation over corpus chunks with one worker per chunk.
///
/// Chunk `i` uses credential `i % n`. Chunks on the same credential share its
/// client and rate limiter, so the per-credential window holds no matter how
/// many of them run at once. Workers write their own files to the artifact
/// directory; the merged artifacts are written once every worker has finished.
pub struct DatasetGenerator {
    config: GenerationConfig,
    credentials: Vec<String>,
    factory: ClientFactory,
    store: Arc<JsonArtifactStore>,
}

impl DatasetGenerator {
    pub fn new(
        config: GenerationConfig,
        credentials: Vec<String>,
        factory: ClientFactory,
        store: Arc<JsonArtifactStore>,
    ) -> Result<Self> {
        if credentials.is_empty() {
            anyhow::bail!("dataset generation needs at least one credential");
        }

        Ok(Self {
            config,
            credentials,
            factory,
            store,
        })
    }

    pub async fn run(&self, chunks: Vec<CorpusChunk>) -> Result<GenerationSummary> {
        let workers = self.credentials.len().min(chunks.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        let lanes = self
            .credentials
            .iter()
            .map(|credential| {
                Ok(CredentialLane {
                    client: (self.factory)(credential.as_str()),
                    limiter: Arc::new(self.config.rate_limiter()?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(chunks = chunks.len(), workers, credentials = lanes.len(), "Starting dataset generation");

        for chunk in chunks {
            let lane = lanes[chunk.index % lanes.len()].clone();
            let annotator = Annotator::new(lane.client, lane.limiter)
                .with_retry(self.config.retry_policy())
                .with_entity_types(self.config.entity_types.clone());

            let worker = ChunkWorker {
                chunk,
                annotator,
                throttle: self.config.throttle.clone(),
                store: self.store.clone(),
            };
            let semaphore = semaphore.clone();

            let chunk_index = worker.chunk.index;
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => worker.run().await,
                    Err(e) => Err(anyhow::Error::new(e).context("worker pool closed")),
                };
                (chunk_index, result)
            });
        }

        let mut outputs = Vec::new();
        let mut failed_chunks = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(output))) => outputs.push(output),
                Ok((chunk_index, Err(e))) => {
                    warn!(chunk = chunk_index, error = %format!("{:#}", e), "Chunk failed, merging the rest");
                    failed_chunks.push(chunk_index);
                }
                Err(e) => warn!(error = %e, "Generation worker panicked, merging the rest"),
            }
        }
        outputs.sort_by_key(|output| output.report.chunk_index);
        failed_chunks.sort_unstable();

        let mut summary = self.merge(outputs).await?;
        summary.failed_chunks = failed_chunks;
        Ok(summary)
    }

    async fn merge(&self, outputs: Vec<ChunkOutput>) -> Result<GenerationSummary> {
        let mut raw = Vec::new();
        let mut parsed = Vec::new();
        let mut examples = Vec::new();
        let mut unparsed = Vec::new();
        let mut summary = GenerationSummary::default();

        for output in outputs {
            summary.skipped += output.report.attempted - output.report.examples;
            summary.chunks.push(output.report);
            raw.extend(output.raw);
            parsed.extend(output.parsed);
            examples.extend(output.examples);
            unparsed.extend(output.unparsed);
        }
        summary.examples = examples.len();

        self.store.write_records("raw.json", &raw).await?;
        self.store.write_records("parsed.json", &parsed).await?;
        self.store.write_records("examples.json", &examples).await?;
        self.store.write_records("unparsed.json", &unparsed).await?;

        info!(
            examples = summary.examples,
            skipped = summary.skipped,
            unparsed = unparsed.len(),
            "Dataset generation finished"
        );
        Ok(summary)
    }
}

struct ChunkWorker {
    chunk: CorpusChunk,
    annotator: Annotator,
    throttle: ThrottleConfig,
    store: Arc<JsonArtifactStore>,
}

impl ChunkWorker {
    async fn run(self) -> Result<ChunkOutput> {
        let chunk_index = self.chunk.index;
        let mut report = ChunkReport {
            chunk_index,
            chunk_id: self.chunk.chunk_id.clone(),
            ..Default::default()
        };
        let mut raw = Vec::new();
        let mut parsed = Vec::new();
        let mut examples = Vec::new();
        let mut unparsed = Vec::new();

        info!(chunk = chunk_index, passages = self.chunk.len(), "Chunk started");

        for (i, text) in self.chunk.passages.iter().enumerate() {
            if self.throttle.every > 0 && i > 0 && i % self.throttle.every == 0 {
                info!(chunk = chunk_index, calls = i, pause_secs = self.throttle.pause_secs, "Throttling");
                tokio::time::sleep(Duration::from_secs(self.throttle.pause_secs)).await;
            }

            let passage_index = self.chunk.offset + i;
            report.attempted += 1;

            match self.annotator.annotate(text).await {
                Ok(annotation) => {
                    report.generated += 1;
                    report.examples += 1;
                    report.positive_spans += annotation.example.positive_spans.len();
                    report.negative_spans += annotation.example.negatives().len();

                    raw.push(RawResponse {
                        passage_index,
                        text: text.clone(),
                        completion: annotation.completion,
                    });
                    parsed.push(annotation.record);
                    examples.push(annotation.example);
                }
                Err(AnnotateError::Generation(e)) => {
                    report.generation_failures += 1;
                    warn!(chunk = chunk_index, passage = passage_index, error = %format!("{:#}", e), "Skipping passage: generation failed");
                }
                Err(AnnotateError::Parse { completion, source }) => {
                    report.generated += 1;
                    report.parse_failures += 1;
                    warn!(chunk = chunk_index, passage = passage_index, error = %source, "Skipping passage: unusable response");
                    unparsed.push(RawResponse {
                        passage_index,
                        text: text.clone(),
                        completion,
                    });
                }
            }
        }

        self.store
            .write_records(&format!("chunk_{:03}_raw.json", chunk_index), &raw)
            .await?;
        self.store
            .write_records(&format!("chunk_{:03}_parsed.json", chunk_index), &parsed)
            .await?;
        self.store
            .write_records(&format!("chunk_{:03}_examples.json", chunk_index), &examples)
            .await?;
        self.store
            .write_records(&format!("chunk_{:03}_unparsed.json", chunk_index), &unparsed)
            .await?;

        info!(
            chunk = chunk_index,
            examples = report.examples,
            generation_failures = report.generation_failures,
            parse_failures = report.parse_failures,
            "Chunk finished"
        );

        Ok(ChunkOutput {
            report,
            raw,
            parsed,
            examples,
            unparsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use corpus::{PartitionConfig, Partitioner};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Echoes the passage back as a single "thing" entity; fails on "boom", rambles on "???".
    struct EchoGenerator {
        credential: String,
        seen: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            let passage = prompt
                .rsplit("PASSAGE: \"")
                .next()
                .and_then(|rest| rest.split('"').next())
                .unwrap_or_default()
                .to_string();
            self.seen
                .lock()
                .unwrap()
                .push((self.credential.clone(), passage.clone()));

            match passage.as_str() {
                "boom" => anyhow::bail!("upstream unavailable"),
                "???" => Ok("I am not sure what you mean.".to_string()),
                _ => Ok(format!(
                    r#"<start>{{"entities": [{{"entity": "{}", "types": ["thing"]}}], "negative_entities": []}}<end>"#,
                    passage
                )),
            }
        }
    }

    fn factory(seen: Arc<Mutex<Vec<(String, String)>>>) -> ClientFactory {
        Arc::new(move |credential: &str| -> Arc<dyn TextGenerator> {
            Arc::new(EchoGenerator {
                credential: credential.to_string(),
                seen: seen.clone(),
            })
        })
    }

    fn test_config() -> GenerationConfig {
        let mut config = GenerationConfig::default();
        config.chunk_size = 2;
        config.retry.max_retries = 0;
        config
    }

    fn chunks(passages: &[&str], chunk_size: usize) -> Vec<CorpusChunk> {
        Partitioner::new(PartitionConfig {
            chunk_size,
            max_passages: usize::MAX,
            seed: None,
        })
        .partition(passages.iter().map(|p| p.to_string()).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_passages_skipped_and_chunks_merged_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonArtifactStore::create(dir.path()).await.unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let generator = DatasetGenerator::new(
            test_config(),
            vec!["key-a".into(), "key-b".into()],
            factory(seen.clone()),
            store.clone(),
        )
        .unwrap();

        let summary = generator
            .run(chunks(&["alpha", "boom", "???", "delta", "epsilon"], 2))
            .await
            .unwrap();

        assert_eq!(summary.chunks.len(), 3);
        assert_eq!(summary.examples, 3);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.chunks[0].generation_failures, 1);
        assert_eq!(summary.chunks[1].parse_failures, 1);

        let examples: Vec<AnnotatedExample> = store.read_records("examples.json").await.unwrap();
        let firsts: Vec<&str> = examples.iter().map(|e| e.tokens[0].as_str()).collect();
        assert_eq!(firsts, vec!["alpha", "delta", "epsilon"]);

        let raw: Vec<RawResponse> = store.read_records("raw.json").await.unwrap();
        let parsed: Vec<GenerationRecord> = store.read_records("parsed.json").await.unwrap();
        assert_eq!(raw.len(), examples.len());
        assert_eq!(parsed.len(), examples.len());
        assert_eq!(
            raw.iter().map(|r| r.passage_index).collect::<Vec<_>>(),
            vec![0, 3, 4]
        );
        assert!(raw.iter().zip(&parsed).all(|(r, p)| r.text == p.text));

        let unparsed: Vec<RawResponse> = store.read_records("unparsed.json").await.unwrap();
        assert_eq!(unparsed.len(), 1);
        assert_eq!(unparsed[0].passage_index, 2);
        assert_eq!(unparsed[0].completion, "I am not sure what you mean.");

        let chunk_examples: Vec<AnnotatedExample> =
            store.read_records("chunk_001_examples.json").await.unwrap();
        assert_eq!(chunk_examples.len(), 1);
        let chunk_parsed: Vec<GenerationRecord> =
            store.read_records("chunk_001_parsed.json").await.unwrap();
        assert_eq!(chunk_parsed[0].text, "delta");
    }

    #[tokio::test(start_paused = true)]
    async fn test_credentials_assigned_round_robin() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonArtifactStore::create(dir.path()).await.unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let generator = DatasetGenerator::new(
            test_config(),
            vec!["key-a".into(), "key-b".into()],
            factory(seen.clone()),
            store,
        )
        .unwrap();

        generator
            .run(chunks(&["one", "two", "three", "four", "five", "six"], 2))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let keys_for = |passage: &str| -> HashSet<String> {
            seen.iter()
                .filter(|(_, p)| p == passage)
                .map(|(k, _)| k.clone())
                .collect()
        };
        assert_eq!(keys_for("one"), HashSet::from(["key-a".to_string()]));
        assert_eq!(keys_for("three"), HashSet::from(["key-b".to_string()]));
        assert_eq!(keys_for("five"), HashSet::from(["key-a".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_coarse_throttle_pauses_worker() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonArtifactStore::create(dir.path()).await.unwrap());
        let mut config = test_config();
        config.chunk_size = 5;
        config.throttle = ThrottleConfig {
            every: 2,
            pause_secs: 30,
        };
        let generator = DatasetGenerator::new(
            config,
            vec!["key".into()],
            factory(Arc::new(Mutex::new(Vec::new()))),
            store,
        )
        .unwrap();

        let start = tokio::time::Instant::now();
        generator
            .run(chunks(&["a", "b", "c", "d", "e"], 5))
            .await
            .unwrap();

        // pauses before calls 2 and 4
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61));
    }

    /// Records when each credential was used.
    struct TimedGenerator {
        credential: String,
        calls: Arc<Mutex<Vec<(String, tokio::time::Instant)>>>,
    }

    #[async_trait]
    impl TextGenerator for TimedGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((self.credential.clone(), tokio::time::Instant::now()));
            Ok(r#"{"entities": []}"#.to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_sharing_a_credential_share_its_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonArtifactStore::create(dir.path()).await.unwrap());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorder = calls.clone();
        let factory: ClientFactory = Arc::new(move |credential: &str| -> Arc<dyn TextGenerator> {
            Arc::new(TimedGenerator {
                credential: credential.to_string(),
                calls: recorder.clone(),
            })
        });

        let mut config = test_config();
        config.rate_limit.max_requests = 1;
        config.rate_limit.window_secs = 60;
        config.throttle.every = 0;
        let generator = DatasetGenerator::new(config, vec!["key-a".into(), "key-b".into()], factory, store).unwrap();

        // chunk 1 finishes early and frees its slot for chunk 2, which shares key-a with chunk 0
        let passages = |prefix: &str, n: usize| -> Vec<String> { (0..n).map(|i| format!("{prefix} {i}")).collect() };
        let summary = generator
            .run(vec![
                CorpusChunk::new(0, 0, passages("a", 4)),
                CorpusChunk::new(1, 4, passages("b", 1)),
                CorpusChunk::new(2, 5, passages("c", 4)),
            ])
            .await
            .unwrap();
        assert_eq!(summary.examples, 9);
        assert_eq!(summary.skipped, 0);

        let calls = calls.lock().unwrap();
        for key in ["key-a", "key-b"] {
            let mut times: Vec<_> = calls.iter().filter(|(k, _)| k == key).map(|(_, t)| *t).collect();
            times.sort();
            for pair in times.windows(2) {
                assert!(
                    pair[1] - pair[0] >= Duration::from_secs(60),
                    "{key} used twice inside one window"
                );
            }
        }
        assert_eq!(calls.iter().filter(|(k, _)| k == "key-a").count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_does_not_block_merge() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in the way makes chunk 1's first artifact write fail
        std::fs::create_dir(dir.path().join("chunk_001_raw.json")).unwrap();
        let store = Arc::new(JsonArtifactStore::create(dir.path()).await.unwrap());
        let generator = DatasetGenerator::new(
            test_config(),
            vec!["key-a".into(), "key-b".into()],
            factory(Arc::new(Mutex::new(Vec::new()))),
            store.clone(),
        )
        .unwrap();

        let summary = generator
            .run(chunks(&["one", "two", "three", "four", "five", "six"], 2))
            .await
            .unwrap();

        assert_eq!(summary.failed_chunks, vec![1]);
        assert_eq!(summary.chunks.len(), 2);
        let examples: Vec<AnnotatedExample> = store.read_records("examples.json").await.unwrap();
        let firsts: Vec<&str> = examples.iter().map(|e| e.tokens[0].as_str()).collect();
        assert_eq!(firsts, vec!["one", "two", "five", "six"]);
    }

    #[tokio::test]
    async fn test_requires_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonArtifactStore::create(dir.path()).await.unwrap());
        let result = DatasetGenerator::new(
            GenerationConfig::default(),
            Vec::new(),
            factory(Arc::new(Mutex::new(Vec::new()))),
            store,
        );
        assert!(result.is_err());
    }
}
