use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use annotate::{AnnotatedExample, SpanAnnotation};

use crate::batch::{ContrastiveBatch, EncodedBatch};
use crate::error::Result;
use crate::vocab::{PAD_ID, Vocabulary};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollatorConfig {
    /// Tokens kept per text
    pub max_len: usize,
    /// Widest span in tokens
    pub max_width: usize,
}

impl Default for CollatorConfig {
    fn default() -> Self {
        Self {
            max_len: 384,
            max_width: 12,
        }
    }
}

/// Encodes annotated examples into a positive batch and a shape-compatible
/// negative batch.
pub struct ContrastiveBatchCollator {
    vocab: Vocabulary,
    config: CollatorConfig,
    device: Device,
}

impl ContrastiveBatchCollator {
    pub fn new(vocab: Vocabulary, config: CollatorConfig, device: Device) -> Self {
        Self {
            vocab,
            config,
            device,
        }
    }

    pub fn config(&self) -> &CollatorConfig {
        &self.config
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Encode positives, then negatives through the same procedure.
    ///
    /// The negative batch is left out only when the first example has no
    /// `negative_ner` field at all; otherwise examples without negatives get a
    /// row of padding spans.
    pub fn collate(&self, examples: &[AnnotatedExample]) -> Result<ContrastiveBatch> {
        let with_negatives = examples
            .first()
            .is_some_and(|e| e.negative_spans.is_some());

        let positives: Vec<Vec<SpanAnnotation>> = examples
            .iter()
            .map(|e| self.usable_spans(e, &e.positive_spans))
            .collect();
        let negatives: Vec<Vec<SpanAnnotation>> = if with_negatives {
            examples
                .iter()
                .map(|e| self.usable_spans(e, e.negatives()))
                .collect()
        } else {
            Vec::new()
        };

        let classes: Vec<String> = positives
            .iter()
            .chain(negatives.iter())
            .flatten()
            .map(|s| s.label.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let max_spans = positives
            .iter()
            .chain(negatives.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(1);

        let positive = self.encode(examples, &positives, &classes, max_spans)?;
        let negative = if with_negatives {
            Some(self.encode(examples, &negatives, &classes, max_spans)?)
        } else {
            None
        };

        tracing::debug!(
            batch = examples.len(),
            classes = classes.len(),
            max_spans,
            negatives = with_negatives,
            "Collated batch"
        );

        Ok(ContrastiveBatch { positive, negative })
    }

    fn truncated_len(&self, example: &AnnotatedExample) -> usize {
        example.tokens.len().min(self.config.max_len)
    }

    /// Drop spans that are inverted, too wide, or cut off by truncation.
    fn usable_spans(&self, example: &AnnotatedExample, spans: &[SpanAnnotation]) -> Vec<SpanAnnotation> {
        let len = self.truncated_len(example);
        spans
            .iter()
            .filter(|s| s.start <= s.end && s.end < len && s.width() <= self.config.max_width)
            .cloned()
            .collect()
    }

    fn encode(
        &self,
        examples: &[AnnotatedExample],
        spans: &[Vec<SpanAnnotation>],
        classes: &[String],
        max_spans: usize,
    ) -> Result<EncodedBatch> {
        let batch = examples.len();
        let text_lengths: Vec<usize> = examples.iter().map(|e| self.truncated_len(e)).collect();
        let max_len = text_lengths.iter().copied().max().unwrap_or(0).max(1);

        let mut input_ids = vec![PAD_ID; batch * max_len];
        let mut attention_mask = vec![0u32; batch * max_len];
        let mut span_idx = vec![0u32; batch * max_spans * 2];
        let mut span_mask = vec![0u8; batch * max_spans];
        let mut labels = vec![0u32; batch * max_spans];

        for (b, example) in examples.iter().enumerate() {
            let ids = self.vocab.encode(&example.tokens[..text_lengths[b]]);
            let row = b * max_len;
            input_ids[row..row + ids.len()].copy_from_slice(&ids);
            attention_mask[row..row + ids.len()].fill(1);

            for (s, span) in spans[b].iter().enumerate() {
                let slot = b * max_spans + s;
                span_idx[slot * 2] = span.start as u32;
                span_idx[slot * 2 + 1] = span.end as u32;
                span_mask[slot] = 1;
                labels[slot] = classes
                    .binary_search(&span.label)
                    .map(|i| i as u32 + 1)
                    .unwrap_or(0);
            }
        }

        Ok(EncodedBatch {
            input_ids: Tensor::from_vec(input_ids, (batch, max_len), &self.device)?,
            attention_mask: Tensor::from_vec(attention_mask, (batch, max_len), &self.device)?,
            span_idx: Tensor::from_vec(span_idx, (batch, max_spans, 2), &self.device)?,
            span_mask: Tensor::from_vec(span_mask, (batch, max_spans), &self.device)?,
            labels: Tensor::from_vec(labels, (batch, max_spans), &self.device)?,
            text_lengths,
            classes: classes.to_vec(),
        })
    }
}
