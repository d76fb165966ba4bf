use std::collections::HashSet;

use crate::normalizer::LabelNormalizer;
use crate::schema::{AnnotatedExample, EntityMention, SpanAnnotation};
use crate::tokenizer::{Tokenizer, WordTokenizer};

/// Maps textual entity mentions onto inclusive token ranges.
///
/// The passage and every mention go through the same tokenizer. A mention
/// matches every window of the passage whose lowercased tokens equal its own
/// lowercased tokens; each match is emitted once per declared type. Mentions
/// that do not occur are dropped without error.
pub struct SpanAligner<T = WordTokenizer> {
    tokenizer: T,
    normalizer: LabelNormalizer,
}

impl Default for SpanAligner<WordTokenizer> {
    fn default() -> Self {
        Self::new(WordTokenizer)
    }
}

impl<T: Tokenizer> SpanAligner<T> {
    pub fn new(tokenizer: T) -> Self {
        Self {
            tokenizer,
            normalizer: LabelNormalizer::new(),
        }
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Build an annotated example from positive and hard-negative mentions.
    pub fn align(
        &self,
        text: &str,
        positives: &[EntityMention],
        negatives: &[EntityMention],
    ) -> AnnotatedExample {
        let tokens = self.tokenizer.tokenize(text);
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();

        let positive_spans = self.match_mentions(&lowered, positives);
        let negative_spans = self.match_mentions(&lowered, negatives);

        AnnotatedExample {
            tokens,
            positive_spans,
            negative_spans: Some(negative_spans),
        }
    }

    /// Spans for every occurrence of every mention, duplicates removed in emission order.
    pub fn match_mentions(
        &self,
        lowered_tokens: &[String],
        mentions: &[EntityMention],
    ) -> Vec<SpanAnnotation> {
        let mut seen = HashSet::new();
        let mut spans = Vec::new();

        for mention in mentions {
            let labels: Vec<String> = mention
                .types
                .iter()
                .filter_map(|t| self.normalizer.normalize(t))
                .collect();
            if labels.is_empty() {
                continue;
            }

            let entity_tokens: Vec<String> = self
                .tokenizer
                .tokenize(&mention.text)
                .iter()
                .map(|t| t.to_lowercase())
                .collect();

            for start in find_occurrences(lowered_tokens, &entity_tokens) {
                let end = start + entity_tokens.len() - 1;
                for label in &labels {
                    let span = SpanAnnotation::new(start, end, label.clone());
                    if seen.insert(span.clone()) {
                        spans.push(span);
                    }
                }
            }
        }

        spans
    }
}

/// Start index of every window of `haystack` equal to `needle`.
///
/// Tokens never contain whitespace, so element-wise equality is the same as
/// comparing the space-joined strings.
pub fn find_occurrences(haystack: &[String], needle: &[String]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }

    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(start, _)| start)
        .collect()
}
