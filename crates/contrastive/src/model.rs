use candle_core::Tensor;

use crate::batch::EncodedBatch;
use crate::error::Result;

/// Output of the primary forward pass.
///
/// The span embeddings are returned explicitly so the contrastive step never
/// has to capture model internals.
#[derive(Debug, Clone)]
pub struct SpanForward {
    /// Scalar span-classification loss
    pub loss: Tensor,
    /// `[B, S, W, D]`
    pub span_embeddings: Tensor,
}

/// Boundary to a span-based entity model whose weights live elsewhere.
pub trait SpanModel {
    fn forward(&self, batch: &EncodedBatch) -> Result<SpanForward>;

    /// Per-token embeddings for every span slot, `[B, S, W, D]`.
    fn embed_spans(&self, batch: &EncodedBatch) -> Result<Tensor>;

    /// Per-span class logits, `[B, S, C]` with `C = batch.classes.len()`.
    fn classify(&self, batch: &EncodedBatch) -> Result<Tensor>;
}

impl<M: SpanModel + ?Sized> SpanModel for &M {
    fn forward(&self, batch: &EncodedBatch) -> Result<SpanForward> {
        (**self).forward(batch)
    }

    fn embed_spans(&self, batch: &EncodedBatch) -> Result<Tensor> {
        (**self).embed_spans(batch)
    }

    fn classify(&self, batch: &EncodedBatch) -> Result<Tensor> {
        (**self).classify(batch)
    }
}

/// Deterministic model over a fixed token embedding table, for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use candle_core::{D, DType, Device};

    pub struct TableModel {
        /// `[V, D]`
        pub table: Tensor,
        pub max_width: usize,
    }

    impl TableModel {
        /// Token `i` embeds as a one-hot vector on axis `i % dim`.
        pub fn one_hot(vocab: usize, dim: usize, max_width: usize) -> Self {
            let data: Vec<f32> = (0..vocab * dim)
                .map(|k| if k % dim == (k / dim) % dim { 1.0 } else { 0.0 })
                .collect();
            Self {
                table: Tensor::from_vec(data, (vocab, dim), &Device::Cpu).unwrap(),
                max_width,
            }
        }

        fn pooled(&self, batch: &EncodedBatch) -> Result<Tensor> {
            Ok(self.embed_spans(batch)?.mean(2)?)
        }
    }

    impl SpanModel for TableModel {
        fn forward(&self, batch: &EncodedBatch) -> Result<SpanForward> {
            let scores = self.classify(batch)?;
            let loss = scores.sqr()?.mean_all()?;
            Ok(SpanForward {
                loss,
                span_embeddings: self.embed_spans(batch)?,
            })
        }

        fn embed_spans(&self, batch: &EncodedBatch) -> Result<Tensor> {
            let ids: Vec<Vec<u32>> = batch.input_ids.to_vec2()?;
            let spans: Vec<Vec<Vec<u32>>> = batch.span_idx.to_vec3()?;
            let (b, s) = (spans.len(), spans.first().map_or(0, Vec::len));

            // token id per (b, s, w) slot; 0 (padding) past the span end
            let mut gather = Vec::with_capacity(b * s * self.max_width);
            for (row, row_spans) in spans.iter().enumerate() {
                for span in row_spans {
                    let (start, end) = (span[0] as usize, span[1] as usize);
                    for w in 0..self.max_width {
                        let pos = start + w;
                        gather.push(if pos <= end { ids[row][pos] } else { 0 });
                    }
                }
            }

            let index = Tensor::from_vec(gather, b * s * self.max_width, self.table.device())?;
            let dim = self.table.dim(D::Minus1)?;
            Ok(self
                .table
                .index_select(&index, 0)?
                .reshape((b, s, self.max_width, dim))?)
        }

        fn classify(&self, batch: &EncodedBatch) -> Result<Tensor> {
            let pooled = self.pooled(batch)?;
            let (b, s, dim) = pooled.dims3()?;
            let classes = batch.classes.len().max(1);
            let weights = Tensor::ones((dim, classes), DType::F32, pooled.device())?;
            Ok(pooled.reshape((b * s, dim))?.matmul(&weights)?.reshape((b, s, classes))?)
        }
    }
}
