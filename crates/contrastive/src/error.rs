use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContrastiveError {
    #[error("tensor operation failed: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("no anchor spans left after masking")]
    EmptyAnchors,

    #[error("no negative spans left after masking")]
    EmptyNegatives,

    #[error("temperature must be finite and positive, got {0}")]
    InvalidTemperature(f64),
}

pub type Result<T> = std::result::Result<T, ContrastiveError>;
