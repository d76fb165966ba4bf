use serde_json::Value;
use thiserror::Error;

use crate::schema::{EntityMention, GenerationRecord, RecognizedEntity};

/// Why a generator response was rejected.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no {0} payload found in response")]
    NoPayload(&'static str),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Drop markdown fences and, when present, keep only the `<start> ... <end>` body.
pub fn clean_response(raw: &str) -> &str {
    let trimmed = raw.trim();
    let body = match (trimmed.find("<start>"), trimmed.rfind("<end>")) {
        (Some(open), Some(close)) if open + "<start>".len() <= close => {
            &trimmed[open + "<start>".len()..close]
        }
        _ => trimmed,
    };
    body.trim()
}

/// Greedy delimiter match: from the first `open` to the last `close`.
pub fn extract_delimited(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then(|| &text[start..=end])
}

fn strip_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "")
}

/// Parse an annotation response into positive and negative mentions for `text`.
pub fn parse_annotation_response(raw: &str, text: &str) -> Result<GenerationRecord, ParseError> {
    let unfenced = strip_fences(raw);
    let payload = extract_delimited(clean_response(&unfenced), '{', '}')
        .ok_or(ParseError::NoPayload("object"))?;

    let value: Value = serde_json::from_str(payload)?;
    let object = value
        .as_object()
        .ok_or_else(|| ParseError::Malformed("top-level payload is not an object".into()))?;

    let entities = mentions(object.get("entities").ok_or(ParseError::MissingKey("entities"))?)?;
    let negative_entities = match object.get("negative_entities") {
        Some(value) => mentions(value)?,
        None => Vec::new(),
    };

    Ok(GenerationRecord {
        text: text.to_string(),
        entities,
        negative_entities,
    })
}

fn mentions(value: &Value) -> Result<Vec<EntityMention>, ParseError> {
    let mentions: Vec<EntityMention> = serde_json::from_value(value.clone())
        .map_err(|e| ParseError::Malformed(e.to_string()))?;

    if let Some(bad) = mentions.iter().find(|m| m.types.is_empty()) {
        return Err(ParseError::Malformed(format!(
            "entity `{}` has no types",
            bad.text
        )));
    }
    Ok(mentions)
}

/// Parse a recognition response (a JSON array of entity objects).
///
/// Entries missing any of `text`, `label`, `start`, `end`, `score` are skipped.
pub fn parse_recognition_response(raw: &str) -> Result<Vec<RecognizedEntity>, ParseError> {
    let unfenced = strip_fences(raw);
    let payload = extract_delimited(unfenced.trim(), '[', ']')
        .ok_or(ParseError::NoPayload("array"))?;

    let entries: Vec<Value> = serde_json::from_str(payload)?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            if !["start", "end"].iter().all(|k| object.contains_key(*k)) {
                return None;
            }
            Some(RecognizedEntity {
                text: object.get("text")?.as_str()?.to_string(),
                label: object.get("label")?.as_str()?.to_string(),
                score: object.get("score")?.as_f64()? as f32,
            })
        })
        .collect())
}
