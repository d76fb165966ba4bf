use candle_core::Tensor;

/// Prefix distinguishing the hard-negative half of a [`ContrastiveBatch`].
pub const NEGATIVE_PREFIX: &str = "negative_";

/// One side of a training batch in tensor form.
///
/// Shapes: `input_ids` and `attention_mask` are `[B, L]` (u32), `span_idx` is
/// `[B, S, 2]` (u32, inclusive token bounds), `span_mask` is `[B, S]` (u8) and
/// `labels` is `[B, S]` (u32, 0 for padding, otherwise index into `classes` + 1).
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub span_idx: Tensor,
    pub span_mask: Tensor,
    pub labels: Tensor,
    pub text_lengths: Vec<usize>,
    pub classes: Vec<String>,
}

impl EncodedBatch {
    pub fn batch_size(&self) -> usize {
        self.text_lengths.len()
    }

    pub fn max_spans(&self) -> candle_core::Result<usize> {
        self.span_mask.dim(1)
    }

    /// Spans not masked out as padding.
    pub fn valid_spans(&self) -> candle_core::Result<usize> {
        let count = self
            .span_mask
            .to_dtype(candle_core::DType::U32)?
            .sum_all()?
            .to_scalar::<u32>()?;
        Ok(count as usize)
    }

    pub fn named_tensors(&self, prefix: &str) -> Vec<(String, Tensor)> {
        [
            ("input_ids", &self.input_ids),
            ("attention_mask", &self.attention_mask),
            ("span_idx", &self.span_idx),
            ("span_mask", &self.span_mask),
            ("labels", &self.labels),
        ]
        .into_iter()
        .map(|(name, tensor)| (format!("{prefix}{name}"), tensor.clone()))
        .collect()
    }
}

/// Positive batch plus, when the data carries hard negatives, a negative
/// batch with identical shapes.
#[derive(Debug, Clone)]
pub struct ContrastiveBatch {
    pub positive: EncodedBatch,
    pub negative: Option<EncodedBatch>,
}

impl ContrastiveBatch {
    pub fn has_negatives(&self) -> bool {
        self.negative.is_some()
    }

    /// Flat name to tensor listing; negative entries carry [`NEGATIVE_PREFIX`].
    pub fn named_tensors(&self) -> Vec<(String, Tensor)> {
        let mut tensors = self.positive.named_tensors("");
        if let Some(negative) = &self.negative {
            tensors.extend(negative.named_tensors(NEGATIVE_PREFIX));
        }
        tensors
    }
}
