use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

static LABEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-\s]{1,64}$").expect("label pattern is valid"));

/// Rejected request input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("text is empty")]
    EmptyText,

    #[error("text too short ({len} < {min} characters)")]
    TextTooShort { len: usize, min: usize },

    #[error("text too long ({len} > {max} characters)")]
    TextTooLong { len: usize, max: usize },

    #[error("no valid entity types provided")]
    NoEntityTypes,

    #[error("too many entity types ({count} > {max})")]
    TooManyEntityTypes { count: usize, max: usize },

    #[error("invalid entity type names: {0:?}")]
    InvalidEntityTypes(Vec<String>),
}

/// Parse a comma-separated type list.
///
/// Items are trimmed and blanks dropped; duplicates are removed
/// case-insensitively, keeping the first spelling.
pub fn parse_entity_types(raw: &str, max_types: usize) -> Result<Vec<String>, InputError> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect();

    if unique.is_empty() {
        return Err(InputError::NoEntityTypes);
    }
    if unique.len() > max_types {
        return Err(InputError::TooManyEntityTypes {
            count: unique.len(),
            max: max_types,
        });
    }

    let invalid: Vec<String> = unique
        .iter()
        .filter(|t| !LABEL_PATTERN.is_match(t))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(InputError::InvalidEntityTypes(invalid));
    }

    Ok(unique)
}

/// Trim `text` and check its length in characters.
pub fn validate_text(text: &str, min_chars: usize, max_chars: usize) -> Result<&str, InputError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(InputError::EmptyText);
    }

    let len = text.chars().count();
    if len < min_chars {
        return Err(InputError::TextTooShort { len, min: min_chars });
    }
    if len > max_chars {
        return Err(InputError::TextTooLong { len, max: max_chars });
    }
    Ok(text)
}
