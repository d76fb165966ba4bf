use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};

use annotate::SpanAnnotation;

use crate::batch::EncodedBatch;
use crate::error::{ContrastiveError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Minimum sigmoid score for a span to be kept
    pub threshold: f32,
    /// Allow several labels on exactly the same span
    pub multi_label: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            multi_label: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSpan {
    pub span: SpanAnnotation,
    pub score: f32,
}

/// Turn `[B, S, C]` class logits into non-overlapping span annotations per example.
pub fn decode_batch(logits: &Tensor, batch: &EncodedBatch, config: &DecodeConfig) -> Result<Vec<Vec<ScoredSpan>>> {
    let (b, s, c) = logits.dims3()?;
    let expected = [batch.batch_size(), batch.max_spans()?, batch.classes.len()];
    if [b, s, c] != expected {
        return Err(ContrastiveError::ShapeMismatch {
            what: "span logits",
            expected: expected.to_vec(),
            actual: vec![b, s, c],
        });
    }

    let scores: Vec<Vec<Vec<f32>>> = logits.to_dtype(DType::F32)?.to_vec3()?;
    let spans: Vec<Vec<Vec<u32>>> = batch.span_idx.to_vec3()?;
    let mask: Vec<Vec<u32>> = batch.span_mask.to_dtype(DType::U32)?.to_vec2()?;

    let mut decoded = Vec::with_capacity(b);
    for row in 0..b {
        let mut candidates = Vec::new();
        for slot in 0..s {
            if mask[row][slot] == 0 {
                continue;
            }
            let (start, end) = (spans[row][slot][0] as usize, spans[row][slot][1] as usize);
            for (class, logit) in scores[row][slot].iter().enumerate() {
                let score = sigmoid(*logit);
                if score > config.threshold {
                    candidates.push(ScoredSpan {
                        span: SpanAnnotation::new(start, end, batch.classes[class].clone()),
                        score,
                    });
                }
            }
        }
        decoded.push(greedy_select(candidates, config.multi_label));
    }
    Ok(decoded)
}

/// Highest score first; a candidate overlapping an already selected span is
/// rejected. With `multi_label`, an exact-range match under another label is
/// not counted as an overlap.
pub fn greedy_select(mut candidates: Vec<ScoredSpan>, multi_label: bool) -> Vec<ScoredSpan> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut selected: Vec<ScoredSpan> = Vec::new();
    for candidate in candidates {
        let clashes = selected.iter().any(|kept| {
            if multi_label && kept.span.same_range(&candidate.span) {
                kept.span.label == candidate.span.label
            } else {
                kept.span.overlaps(&candidate.span)
            }
        });
        if !clashes {
            selected.push(candidate);
        }
    }

    selected.sort_by_key(|s| (s.span.start, s.span.end));
    selected
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
