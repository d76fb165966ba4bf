use regex::Regex;
use std::sync::LazyLock;

/// Words (allowing internal `-` / `_`), otherwise single non-space characters.
static WORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\w+(?:[-_]\w+)*|\S").expect("word pattern is valid")
});

/// Splits text into an ordered sequence of tokens.
///
/// Implementations must be deterministic and must never produce tokens
/// containing whitespace; the aligner relies on both.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        WORD_PATTERN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}
