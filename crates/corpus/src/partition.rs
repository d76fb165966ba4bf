use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::chunk::CorpusChunk;

pub struct PartitionConfig {
    /// Passages per chunk
    pub chunk_size: usize,
    /// Upper bound on passages taken from the corpus (after shuffling)
    pub max_passages: usize,
    /// Shuffle seed; `None` keeps corpus order
    pub seed: Option<u64>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            max_passages: 3000,
            seed: Some(42),
        }
    }
}

pub struct Partitioner {
    config: PartitionConfig,
}

impl Partitioner {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    /// Split passages into `ceil(n / chunk_size)` independent chunks.
    ///
    /// Chunk order and the order of passages inside each chunk are fixed by
    /// the seed, so two runs with the same corpus and seed produce the same
    /// chunks (and the same chunk ids).
    pub fn partition(&self, mut passages: Vec<String>) -> Vec<CorpusChunk> {
        passages.retain(|p| !p.trim().is_empty());

        if let Some(seed) = self.config.seed {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            passages.shuffle(&mut rng);
        }
        passages.truncate(self.config.max_passages);

        let chunk_size = self.config.chunk_size.max(1);
        let mut chunks = Vec::with_capacity(passages.len().div_ceil(chunk_size));
        let mut offset = 0;

        for (index, slice) in passages.chunks(chunk_size).enumerate() {
            chunks.push(CorpusChunk::new(index, offset, slice.to_vec()));
            offset += slice.len();
        }

        chunks
    }
}
