use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Canonical form of entity type labels coming back from the generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelNormalizer;

impl LabelNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase, underscores to spaces, collapse whitespace.
    /// Returns `None` for labels that are empty after normalization.
    pub fn normalize(&self, label: &str) -> Option<String> {
        let lowered = label.to_lowercase().replace('_', " ");
        let collapsed = WHITESPACE.replace_all(lowered.trim(), " ");

        if collapsed.is_empty() {
            None
        } else {
            Some(collapsed.into_owned())
        }
    }
}
