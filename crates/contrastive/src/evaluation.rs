use serde::Serialize;
use std::collections::HashSet;

use annotate::SpanAnnotation;

/// Micro-averaged scores over exact `(start, end, label)` matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: usize,
    pub predicted: usize,
    pub gold: usize,
}

/// Compare predictions with gold annotations, example by example.
///
/// Duplicate spans within one example count once. Extra trailing examples on
/// either side are scored against an empty list.
pub fn evaluate(predictions: &[Vec<SpanAnnotation>], gold: &[Vec<SpanAnnotation>]) -> Metrics {
    let empty = Vec::new();
    let mut metrics = Metrics::default();

    for i in 0..predictions.len().max(gold.len()) {
        let predicted: HashSet<&SpanAnnotation> = predictions.get(i).unwrap_or(&empty).iter().collect();
        let expected: HashSet<&SpanAnnotation> = gold.get(i).unwrap_or(&empty).iter().collect();

        metrics.true_positives += predicted.intersection(&expected).count();
        metrics.predicted += predicted.len();
        metrics.gold += expected.len();
    }

    let tp = metrics.true_positives as f64;
    metrics.precision = ratio(tp, metrics.predicted as f64);
    metrics.recall = ratio(tp, metrics.gold as f64);
    metrics.f1 = ratio(2.0 * metrics.precision * metrics.recall, metrics.precision + metrics.recall);
    metrics
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}
