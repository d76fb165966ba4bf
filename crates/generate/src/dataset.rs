use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use annotate::AnnotatedExample;

/// Frequency of positive entity types across a dataset.
#[derive(Debug, Clone, Default)]
pub struct TypeStats {
    counts: HashMap<String, usize>,
}

impl TypeStats {
    pub fn from_examples(examples: &[AnnotatedExample]) -> Self {
        let mut counts = HashMap::new();
        for span in examples.iter().flat_map(|e| &e.positive_spans) {
            *counts.entry(span.label.clone()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn unique_types(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, label: &str) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Top `n` types by count; ties broken alphabetically.
    pub fn most_common(&self, n: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> =
            self.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    pub fn top_types(&self, n: usize) -> Vec<String> {
        self.most_common(n).into_iter().map(|(label, _)| label).collect()
    }
}

/// Keep only spans whose type is allowed; drop examples left without positives.
pub fn filter_by_types(
    examples: Vec<AnnotatedExample>,
    allowed: &HashSet<String>,
) -> Vec<AnnotatedExample> {
    let before = examples.len();

    let filtered: Vec<AnnotatedExample> = examples
        .into_iter()
        .filter_map(|mut example| {
            example.positive_spans.retain(|s| allowed.contains(&s.label));
            if let Some(negatives) = example.negative_spans.as_mut() {
                negatives.retain(|s| allowed.contains(&s.label));
            }
            (!example.positive_spans.is_empty()).then_some(example)
        })
        .collect();

    tracing::info!(before, after = filtered.len(), "Filtered examples by entity type");
    filtered
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetSplit {
    pub train: Vec<AnnotatedExample>,
    pub validation: Vec<AnnotatedExample>,
    pub test: Vec<AnnotatedExample>,
}

/// Seeded shuffle, then carve off test and validation fractions.
pub fn split_dataset(
    mut examples: Vec<AnnotatedExample>,
    validation_ratio: f64,
    test_ratio: f64,
    seed: u64,
) -> DatasetSplit {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    examples.shuffle(&mut rng);

    let n = examples.len();
    let n_test = ((n as f64) * test_ratio.clamp(0.0, 1.0)).round() as usize;
    let n_validation =
        (((n as f64) * validation_ratio.clamp(0.0, 1.0)).round() as usize).min(n - n_test);

    let test = examples.split_off(n - n_test);
    let validation = examples.split_off(examples.len() - n_validation);

    DatasetSplit {
        train: examples,
        validation,
        test,
    }
}
