pub mod cache;
pub mod config;
pub mod context;
pub mod fallback;
pub mod labels;
pub mod reconciler;

pub use cache::{CacheStats, ResponseCache};
pub use config::InferenceConfig;
pub use context::AppContext;
pub use fallback::LlmEntityPredictor;
pub use labels::{InputError, parse_entity_types, validate_text};
pub use reconciler::{ReconciledEntity, reconcile};
