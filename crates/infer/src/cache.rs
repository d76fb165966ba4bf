use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::reconciler::ReconciledEntity;

/// Bounded cache of prediction results keyed by request content.
pub struct ResponseCache {
    entries: DashMap<String, Vec<ReconciledEntity>>,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Stable key for a request; type order matters.
    pub fn key(text: &str, types: &[String], threshold: f32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        for t in types {
            hasher.update([0u8]);
            hasher.update(t.as_bytes());
        }
        hasher.update(threshold.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Vec<ReconciledEntity>> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub fn insert(&self, key: String, entities: Vec<ReconciledEntity>) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.len() >= self.max_entries {
            // Evict a quarter when full
            let to_remove: Vec<_> = self
                .entries
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.entries.remove(&key);
            }
        }
        self.entries.insert(key, entities);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            max_entries: self.max_entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
}
