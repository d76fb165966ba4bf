use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use annotate::AnnotatedExample;
use generate::{
    DatasetGenerator, GenerationConfig, GenerationSummary, JsonArtifactStore, TypeStats,
    filter_by_types,
};

/// Entity types kept in the filtered training file.
const TOP_TYPES: usize = 70;

#[derive(Serialize)]
struct RunManifest<'a> {
    run_id: String,
    corpus: &'a PathBuf,
    config: &'a GenerationConfig,
    credentials: usize,
    summary: &'a GenerationSummary,
    top_types: Vec<(String, usize)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    generate::init_tracing();

    let mut args = std::env::args().skip(1);
    let usage = "usage: generate_dataset <corpus> <output_dir> [config.json]";
    let corpus = PathBuf::from(args.next().context(usage)?);
    let output = PathBuf::from(args.next().context(usage)?);

    let config = match args.next() {
        Some(path) => GenerationConfig::load(&PathBuf::from(path)).await?,
        None => GenerationConfig::default(),
    };
    let credentials = config.credentials()?;

    let run_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(run_id = %run_id, corpus = ?corpus, model = %config.model, "Starting run");

    let chunks = corpus::load_chunks(&corpus, config.partition_config()).await?;
    let store = Arc::new(JsonArtifactStore::create(&output).await?);

    let generator = DatasetGenerator::new(
        config.clone(),
        credentials.clone(),
        config.client_factory(),
        store.clone(),
    )?;
    let summary = generator.run(chunks).await?;

    let examples: Vec<AnnotatedExample> = store.read_records("examples.json").await?;
    let stats = TypeStats::from_examples(&examples);
    let top_types = stats.most_common(TOP_TYPES);
    tracing::info!(
        unique_types = stats.unique_types(),
        kept = top_types.len(),
        "Entity type distribution"
    );

    let allowed: HashSet<String> = top_types.iter().map(|(label, _)| label.clone()).collect();
    let filtered = filter_by_types(examples, &allowed);
    store.write_records("examples_top_types.json", &filtered).await?;

    let manifest = RunManifest {
        run_id,
        corpus: &corpus,
        config: &config,
        credentials: credentials.len(),
        summary: &summary,
        top_types,
    };
    let manifest_path = store.path("run.json");
    tokio::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .await
        .context(format!("Failed to write manifest: {:?}", manifest_path))?;

    tracing::info!(
        examples = summary.examples,
        skipped = summary.skipped,
        output = ?output,
        "Run complete"
    );
    Ok(())
}
