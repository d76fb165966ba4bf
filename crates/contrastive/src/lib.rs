pub mod adapter;
pub mod batch;
pub mod collator;
pub mod decode;
pub mod error;
pub mod evaluation;
pub mod loss;
pub mod model;
pub mod vocab;

pub use adapter::{ContrastiveModelAdapter, StepOutcome, TrainingStep};
pub use batch::{ContrastiveBatch, EncodedBatch, NEGATIVE_PREFIX};
pub use collator::{CollatorConfig, ContrastiveBatchCollator};
pub use decode::{DecodeConfig, ScoredSpan, decode_batch, greedy_select};
pub use error::{ContrastiveError, Result};
pub use evaluation::{Metrics, evaluate};
pub use loss::{InfoNceLoss, LossConfig, scalar_value};
pub use model::{SpanForward, SpanModel};
pub use vocab::Vocabulary;
