use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An entity mention as returned by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    #[serde(rename = "entity", deserialize_with = "scalar_string")]
    pub text: String,
    #[serde(deserialize_with = "one_or_many")]
    pub types: Vec<String>,
}

impl EntityMention {
    pub fn new(text: impl Into<String>, types: &[&str]) -> Self {
        Self {
            text: text.into(),
            types: types.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Parsed generation output for one passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub text: String,
    pub entities: Vec<EntityMention>,
    #[serde(default)]
    pub negative_entities: Vec<EntityMention>,
}

/// Inclusive token range with a type label. Serialized as `[start, end, "label"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize, String)", into = "(usize, usize, String)")]
pub struct SpanAnnotation {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

impl SpanAnnotation {
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }

    /// Number of tokens covered.
    pub fn width(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn same_range(&self, other: &SpanAnnotation) -> bool {
        self.start == other.start && self.end == other.end
    }

    pub fn overlaps(&self, other: &SpanAnnotation) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl From<(usize, usize, String)> for SpanAnnotation {
    fn from((start, end, label): (usize, usize, String)) -> Self {
        Self { start, end, label }
    }
}

impl From<SpanAnnotation> for (usize, usize, String) {
    fn from(span: SpanAnnotation) -> Self {
        (span.start, span.end, span.label)
    }
}

/// A tokenized passage with its positive and hard-negative span annotations.
///
/// `negative_spans` is `None` for data that never had hard negatives generated
/// (plain NER corpora). `Some(vec![])` means negatives were requested but none
/// could be aligned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedExample {
    #[serde(rename = "tokenized_text")]
    pub tokens: Vec<String>,
    #[serde(rename = "ner")]
    pub positive_spans: Vec<SpanAnnotation>,
    #[serde(
        rename = "negative_ner",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub negative_spans: Option<Vec<SpanAnnotation>>,
}

impl AnnotatedExample {
    pub fn negatives(&self) -> &[SpanAnnotation] {
        self.negative_spans.as_deref().unwrap_or(&[])
    }

    /// Tokens covered by `span`, joined with single spaces.
    pub fn span_text(&self, span: &SpanAnnotation) -> Option<String> {
        self.tokens
            .get(span.start..=span.end)
            .map(|tokens| tokens.join(" "))
    }
}

/// One entry of a serving-time recognition response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedEntity {
    pub text: String,
    pub label: String,
    pub score: f32,
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a scalar entity, got {}",
            other
        ))),
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(label) => vec![label],
        OneOrMany::Many(labels) => labels,
    })
}
