pub mod chunk;
pub mod partition;
pub mod reader;

pub use chunk::CorpusChunk;
pub use partition::{PartitionConfig, Partitioner};
pub use reader::CorpusReader;

use anyhow::Result;
use std::path::Path;

/// Load passages from a JSON corpus file, a text file, or a directory of text files.
pub async fn load_corpus(path: &Path) -> Result<Vec<String>> {
    if path.is_dir() {
        return CorpusReader::read_directory(path).await;
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => CorpusReader::read_json(path).await,
        _ => CorpusReader::read_text(path).await,
    }
}

/// Main partitioning pipeline
pub async fn load_chunks(path: &Path, config: PartitionConfig) -> Result<Vec<CorpusChunk>> {
    let passages = load_corpus(path).await?;
    let chunks = Partitioner::new(config).partition(passages);

    tracing::info!(
        corpus = ?path,
        chunks = chunks.len(),
        "Partitioned corpus"
    );

    Ok(chunks)
}
