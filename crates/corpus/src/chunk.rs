use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A contiguous slice of the corpus handled by a single generation worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusChunk {
    pub chunk_id: String,
    pub index: usize,
    /// Offset of the first passage within the shuffled corpus
    pub offset: usize,
    pub passages: Vec<String>,
}

impl CorpusChunk {
    pub fn new(index: usize, offset: usize, passages: Vec<String>) -> Self {
        // Stable id derived from content, so reruns over the same corpus line up
        let chunk_id = Self::generate_chunk_id(index, offset, &passages);

        Self {
            chunk_id,
            index,
            offset,
            passages,
        }
    }

    fn generate_chunk_id(index: usize, offset: usize, passages: &[String]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(index.to_string().as_bytes());
        hasher.update(offset.to_string().as_bytes());
        for passage in passages {
            hasher.update(passage.as_bytes());
            hasher.update([0u8]);
        }
        let result = hasher.finalize();
        hex::encode(&result[..16]) // first 16 bytes (32 hex chars)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}
