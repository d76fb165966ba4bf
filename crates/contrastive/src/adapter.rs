use candle_core::Tensor;
use serde::Serialize;
use tracing::{debug, warn};

use crate::batch::{ContrastiveBatch, EncodedBatch};
use crate::error::Result;
use crate::loss::{InfoNceLoss, LossConfig, scalar_value};
use crate::model::SpanModel;

/// How a training step's loss was assembled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Primary loss plus `alpha` times the contrastive loss.
    Contrastive { contrastive_loss: f32 },
    /// The batch carried no negatives.
    PrimaryOnly,
    /// The contrastive term failed and was left out.
    Degraded { reason: String },
}

#[derive(Debug, Clone)]
pub struct TrainingStep {
    /// Scalar loss to backpropagate
    pub loss: Tensor,
    pub primary_loss: f32,
    pub outcome: StepOutcome,
}

impl TrainingStep {
    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, StepOutcome::Degraded { .. })
    }
}

/// Wraps a [`SpanModel`] and adds a hard-negative InfoNCE term to its loss.
pub struct ContrastiveModelAdapter<M> {
    model: M,
    loss: InfoNceLoss,
    alpha: f64,
}

impl<M: SpanModel> ContrastiveModelAdapter<M> {
    pub fn new(model: M, config: &LossConfig) -> Result<Self> {
        Ok(Self {
            model,
            loss: InfoNceLoss::new(config.temperature)?,
            alpha: config.alpha,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_inner(self) -> M {
        self.model
    }

    /// One training step.
    ///
    /// A failing primary forward pass is returned as an error. Anything that
    /// goes wrong in the contrastive term only degrades the step to the
    /// primary loss.
    pub fn step(&self, batch: &ContrastiveBatch) -> Result<TrainingStep> {
        let primary = self.model.forward(&batch.positive)?;
        let primary_loss = scalar_value(&primary.loss)?;

        let Some(negative) = &batch.negative else {
            return Ok(TrainingStep {
                loss: primary.loss,
                primary_loss,
                outcome: StepOutcome::PrimaryOnly,
            });
        };

        let contrastive = self
            .contrastive_loss(&primary.span_embeddings, &batch.positive, negative)
            .and_then(|loss| Ok((scalar_value(&loss)?, loss)));

        let degrade = |reason: String| {
            warn!(reason = %reason, primary_loss, "Contrastive loss skipped for this step");
            Ok(TrainingStep {
                loss: primary.loss.clone(),
                primary_loss,
                outcome: StepOutcome::Degraded { reason },
            })
        };

        match contrastive {
            Ok((value, loss)) if value.is_finite() => {
                let total = (&primary.loss + loss.affine(self.alpha, 0.0)?)?;
                debug!(primary_loss, contrastive_loss = value, "Contrastive step");
                Ok(TrainingStep {
                    loss: total,
                    primary_loss,
                    outcome: StepOutcome::Contrastive {
                        contrastive_loss: value,
                    },
                })
            }
            Ok((value, _)) => degrade(format!("non-finite contrastive loss: {value}")),
            Err(e) => degrade(e.to_string()),
        }
    }

    /// Positive and negative embeddings are recomputed, not taken from the
    /// primary pass.
    fn contrastive_loss(
        &self,
        anchor: &Tensor,
        positive_batch: &EncodedBatch,
        negative_batch: &EncodedBatch,
    ) -> Result<Tensor> {
        let positive = self.model.embed_spans(positive_batch)?;
        let negative = self.model.embed_spans(negative_batch)?;

        self.loss.forward_masked(
            anchor,
            &positive,
            &negative,
            &positive_batch.span_mask,
            &negative_batch.span_mask,
        )
    }
}
