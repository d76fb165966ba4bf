use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use annotate::RecognizedEntity;

/// An entity placed in the source text. Offsets are in characters, `end`
/// exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledEntity {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// Re-derive entity offsets from the source text, ignoring whatever
/// positions the model reported.
///
/// Entities are placed in output order with a forward-moving cursor. A
/// `(text, label, start, end)` placement is used at most once; when the found
/// occurrence is taken the search moves on to the next one. The cursor moves
/// past the current match only when the next entity has different text, so a
/// run of same-text entities can share one location under different labels.
/// Entities that cannot be placed are dropped.
pub fn reconcile(text: &str, entities: &[RecognizedEntity]) -> Vec<ReconciledEntity> {
    let mut used: HashSet<(&str, &str, usize, usize)> = HashSet::new();
    let mut placed = Vec::new();
    let mut cursor = 0;

    for (i, entity) in entities.iter().enumerate() {
        if entity.text.is_empty() {
            continue;
        }

        let mut from = cursor;
        let found = loop {
            let Some(offset) = text[from..].find(entity.text.as_str()) else {
                break None;
            };
            let start = from + offset;
            let end = start + entity.text.len();
            if used.insert((entity.text.as_str(), entity.label.as_str(), start, end)) {
                break Some((start, end));
            }
            from = next_char_boundary(text, start);
        };

        let Some((start, end)) = found else {
            tracing::debug!(entity = %entity.text, label = %entity.label, "Entity not found in text");
            continue;
        };

        placed.push(ReconciledEntity {
            text: entity.text.clone(),
            label: entity.label.clone(),
            start: char_offset(text, start),
            end: char_offset(text, end),
            score: entity.score,
        });

        let next_differs = entities.get(i + 1).is_none_or(|next| next.text != entity.text);
        if next_differs {
            cursor = next_char_boundary(text, start);
        }
    }

    placed
}

fn next_char_boundary(text: &str, byte: usize) -> usize {
    text[byte..]
        .chars()
        .next()
        .map_or(text.len(), |c| byte + c.len_utf8())
}

fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}
