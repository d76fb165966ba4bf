use candle_core::{D, DType, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{ContrastiveError, Result};

const NORM_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// InfoNCE temperature
    pub temperature: f64,
    /// Weight of the contrastive term in the total loss
    pub alpha: f64,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            alpha: 0.1,
        }
    }
}

/// InfoNCE over span embeddings with in-batch negatives.
///
/// Every anchor is scored against its own positive and against every negative
/// in the batch, so the negative pool is shared across examples.
#[derive(Debug, Clone)]
pub struct InfoNceLoss {
    temperature: f64,
}

impl InfoNceLoss {
    pub fn new(temperature: f64) -> Result<Self> {
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(ContrastiveError::InvalidTemperature(temperature));
        }
        Ok(Self { temperature })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Loss for `[B, S, W, D]` anchor, positive and negative span embeddings.
    pub fn forward(&self, anchor: &Tensor, positive: &Tensor, negative: &Tensor) -> Result<Tensor> {
        let (anchor, positive, negative) = self.pool_all(anchor, positive, negative)?;
        self.contrast(&anchor, &positive, &negative)
    }

    /// Like [`forward`](Self::forward) but ignores padded spans.
    ///
    /// `positive_mask` (`[B, S]`) selects anchors and positives, `negative_mask`
    /// (`[B, S']`) selects negatives.
    pub fn forward_masked(
        &self,
        anchor: &Tensor,
        positive: &Tensor,
        negative: &Tensor,
        positive_mask: &Tensor,
        negative_mask: &Tensor,
    ) -> Result<Tensor> {
        let (anchor, positive, negative) = self.pool_all(anchor, positive, negative)?;
        let (batch, spans, _) = {
            let dims = positive.dims();
            (dims[0], dims[1], dims[2])
        };
        let neg_dims = negative.dims();
        check_shape("positive span mask", &[batch, spans], positive_mask.dims())?;
        check_shape("negative span mask", &neg_dims[..2], negative_mask.dims())?;

        let anchors_kept = kept_rows(positive_mask)?;
        if anchors_kept.is_empty() {
            return Err(ContrastiveError::EmptyAnchors);
        }
        let negatives_kept = kept_rows(negative_mask)?;
        if negatives_kept.is_empty() {
            return Err(ContrastiveError::EmptyNegatives);
        }

        let device = anchor.device();
        let anchor_rows = Tensor::new(anchors_kept.as_slice(), device)?;
        let negative_rows = Tensor::new(negatives_kept.as_slice(), device)?;

        self.contrast(
            &anchor.flatten_to(1)?.index_select(&anchor_rows, 0)?,
            &positive.flatten_to(1)?.index_select(&anchor_rows, 0)?,
            &negative.flatten_to(1)?.index_select(&negative_rows, 0)?,
        )
    }

    /// Mean-pool over width and L2-normalize; returns `[B, S, D]` tensors.
    fn pool_all(&self, anchor: &Tensor, positive: &Tensor, negative: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        check_rank("anchor embeddings", anchor)?;
        check_rank("positive embeddings", positive)?;
        check_rank("negative embeddings", negative)?;
        check_shape("positive embeddings", anchor.dims(), positive.dims())?;

        let dim = anchor.dims()[3];
        let neg_dim = negative.dims()[3];
        if neg_dim != dim {
            return Err(ContrastiveError::ShapeMismatch {
                what: "negative embedding width",
                expected: vec![dim],
                actual: vec![neg_dim],
            });
        }

        Ok((pool(anchor)?, pool(positive)?, pool(negative)?))
    }

    /// Core InfoNCE on flattened `[N, D]` anchors/positives and `[M, D]` negatives.
    fn contrast(&self, anchor: &Tensor, positive: &Tensor, negative: &Tensor) -> Result<Tensor> {
        let anchor = anchor.flatten_to(anchor.rank().saturating_sub(2))?;
        let positive = positive.flatten_to(positive.rank().saturating_sub(2))?;
        let negative = negative.flatten_to(negative.rank().saturating_sub(2))?;

        let n = anchor.dim(0)?;
        if n == 0 {
            return Err(ContrastiveError::EmptyAnchors);
        }
        if negative.dim(0)? == 0 {
            return Err(ContrastiveError::EmptyNegatives);
        }

        // [N, 1] paired similarity, [N, M] against the shared negative pool
        let pos_logits = (&anchor * &positive)?.sum_keepdim(1)?;
        let neg_logits = anchor.matmul(&negative.t()?)?;

        let logits = Tensor::cat(&[&pos_logits, &neg_logits], 1)?.affine(1.0 / self.temperature, 0.0)?;
        let targets = Tensor::zeros(n, DType::U32, anchor.device())?;

        Ok(candle_nn::loss::cross_entropy(&logits, &targets)?)
    }
}

fn pool(embeddings: &Tensor) -> Result<Tensor> {
    let pooled = embeddings.mean(2)?;
    let norm = pooled
        .sqr()?
        .sum_keepdim(D::Minus1)?
        .sqrt()?
        .affine(1.0, NORM_EPS)?;
    Ok(pooled.broadcast_div(&norm)?)
}

/// Flat indices of unmasked entries.
fn kept_rows(mask: &Tensor) -> Result<Vec<u32>> {
    let flags: Vec<u32> = mask.flatten_all()?.to_dtype(DType::U32)?.to_vec1()?;
    Ok(flags
        .iter()
        .enumerate()
        .filter(|(_, flag)| **flag != 0)
        .map(|(i, _)| i as u32)
        .collect())
}

fn check_rank(what: &'static str, tensor: &Tensor) -> Result<()> {
    if tensor.rank() != 4 {
        return Err(ContrastiveError::ShapeMismatch {
            what,
            expected: vec![4],
            actual: vec![tensor.rank()],
        });
    }
    Ok(())
}

fn check_shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected != actual {
        return Err(ContrastiveError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// Read a scalar loss back to the host.
pub fn scalar_value(loss: &Tensor) -> Result<f32> {
    Ok(loss.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?.first().copied().unwrap_or(f32::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    /// `[1, n, 1, dim]` embeddings from row vectors.
    fn spans(rows: &[Vec<f32>]) -> Tensor {
        let dim = rows[0].len();
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (1, rows.len(), 1, dim), &Device::Cpu).unwrap()
    }

    fn basis(dim: usize, i: usize) -> Vec<f32> {
        (0..dim).map(|j| if i == j { 1.0 } else { 0.0 }).collect()
    }

    #[test]
    fn test_identical_positive_orthogonal_negatives_near_zero() {
        let anchor = spans(&[basis(4, 0), basis(4, 1)]);
        let negative = spans(&[basis(4, 2), basis(4, 3)]);

        let loss = InfoNceLoss::new(0.01).unwrap();
        let value = scalar_value(&loss.forward(&anchor, &anchor, &negative).unwrap()).unwrap();
        assert!(value < 1e-6, "loss = {value}");
    }

    #[test]
    fn test_mismatched_positives_approach_log_one_plus_negatives() {
        let anchor = spans(&[basis(8, 0), basis(8, 1)]);
        // Each positive is orthogonal to its anchor
        let positive = spans(&[basis(8, 2), basis(8, 3)]);
        let negative = spans(&[basis(8, 4), basis(8, 5), basis(8, 6)]);

        let loss = InfoNceLoss::new(0.1).unwrap();
        let value = scalar_value(&loss.forward(&anchor, &positive, &negative).unwrap()).unwrap();
        assert!((value - 4f32.ln()).abs() < 1e-4, "loss = {value}");
    }

    #[test]
    fn test_negatives_shared_across_batch() {
        // anchor 0 is attracted to the negative that belongs to the second example
        let anchor = Tensor::from_vec(vec![1f32, 0., 0., 1.], (2, 1, 1, 2), &Device::Cpu).unwrap();
        let negative = Tensor::from_vec(vec![0f32, 1., 1., 0.], (2, 1, 1, 2), &Device::Cpu).unwrap();

        let loss = InfoNceLoss::new(1.0).unwrap();
        let value = scalar_value(&loss.forward(&anchor, &anchor, &negative).unwrap()).unwrap();
        // logits per anchor: [1, 0, 1] -> -ln(e / (2e + 1))
        let expected = -(1f32.exp() / (2.0 * 1f32.exp() + 1.0)).ln();
        assert!((value - expected).abs() < 1e-5, "loss = {value}");
    }

    #[test]
    fn test_width_is_mean_pooled() {
        // two width slots averaging to the anchor direction
        let anchor = Tensor::from_vec(vec![1f32, 0., 1., 0.], (1, 1, 2, 2), &Device::Cpu).unwrap();
        let positive = Tensor::from_vec(vec![2f32, 1., 0., -1.], (1, 1, 2, 2), &Device::Cpu).unwrap();
        let negative = spans(&[vec![0., 1.]]);

        let loss = InfoNceLoss::new(0.01).unwrap();
        let value = scalar_value(&loss.forward(&anchor, &positive, &negative).unwrap()).unwrap();
        assert!(value < 1e-6);
    }

    #[test]
    fn test_masked_forward_rejects_empty_sets() {
        let anchor = spans(&[basis(2, 0)]);
        let negative = spans(&[basis(2, 1)]);
        let on = Tensor::new(&[[1u8]], &Device::Cpu).unwrap();
        let off = Tensor::new(&[[0u8]], &Device::Cpu).unwrap();
        let loss = InfoNceLoss::new(0.1).unwrap();

        assert!(loss.forward_masked(&anchor, &anchor, &negative, &on, &on).is_ok());
        assert!(matches!(
            loss.forward_masked(&anchor, &anchor, &negative, &off, &on),
            Err(ContrastiveError::EmptyAnchors)
        ));
        assert!(matches!(
            loss.forward_masked(&anchor, &anchor, &negative, &on, &off),
            Err(ContrastiveError::EmptyNegatives)
        ));
    }

    #[test]
    fn test_masked_forward_ignores_padding() {
        let anchor = spans(&[basis(3, 0), vec![0.0; 3]]);
        let negative = spans(&[basis(3, 1), basis(3, 0)]);
        let mask = Tensor::new(&[[1u8, 0]], &Device::Cpu).unwrap();
        let neg_mask = Tensor::new(&[[1u8, 0]], &Device::Cpu).unwrap();

        let loss = InfoNceLoss::new(0.01).unwrap();
        let value = scalar_value(&loss.forward_masked(&anchor, &anchor, &negative, &mask, &neg_mask).unwrap()).unwrap();
        assert!(value < 1e-6);
    }

    #[test]
    fn test_shape_errors() {
        let loss = InfoNceLoss::new(0.1).unwrap();
        let a = spans(&[basis(3, 0)]);
        let b = spans(&[basis(3, 0), basis(3, 1)]);
        let narrow = spans(&[basis(2, 0)]);

        assert!(matches!(loss.forward(&a, &b, &a), Err(ContrastiveError::ShapeMismatch { .. })));
        assert!(matches!(loss.forward(&a, &a, &narrow), Err(ContrastiveError::ShapeMismatch { .. })));

        let wrong_mask = Tensor::new(&[[1u8, 1]], &Device::Cpu).unwrap();
        let ok_mask = Tensor::new(&[[1u8]], &Device::Cpu).unwrap();
        assert!(matches!(
            loss.forward_masked(&a, &a, &a, &wrong_mask, &ok_mask),
            Err(ContrastiveError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_temperature() {
        assert!(matches!(InfoNceLoss::new(0.0), Err(ContrastiveError::InvalidTemperature(_))));
        assert!(InfoNceLoss::new(f64::NAN).is_err());
    }
}
