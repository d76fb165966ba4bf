use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use annotate::AnnotatedExample;

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

const PAD_TOKEN: &str = "<pad>";
const UNK_TOKEN: &str = "<unk>";

/// Lowercased token to id mapping. Ids 0 and 1 are reserved for padding
/// and unknown tokens. Serialized as the plain token list, in id order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl From<Vec<String>> for Vocabulary {
    fn from(tokens: Vec<String>) -> Self {
        let mut vocab = Self {
            tokens,
            index: HashMap::new(),
        };
        vocab.reindex();
        vocab
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.tokens
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::from_tokens(std::iter::empty::<&str>())
    }
}

impl Vocabulary {
    /// Ids are assigned in first-seen order.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Self::from(vec![PAD_TOKEN.to_string(), UNK_TOKEN.to_string()]);

        for token in tokens {
            let token = token.as_ref().to_lowercase();
            if !vocab.index.contains_key(&token) {
                vocab.index.insert(token.clone(), vocab.tokens.len() as u32);
                vocab.tokens.push(token);
            }
        }
        vocab
    }

    pub fn from_examples(examples: &[AnnotatedExample]) -> Self {
        Self::from_tokens(examples.iter().flat_map(|e| e.tokens.iter()))
    }

    fn reindex(&mut self) {
        self.index = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
    }

    pub fn id(&self, token: &str) -> u32 {
        self.index
            .get(&token.to_lowercase())
            .copied()
            .unwrap_or(UNK_ID)
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    pub fn encode(&self, tokens: &[String]) -> Vec<u32> {
        tokens.iter().map(|t| self.id(t)).collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.len() <= 2
    }
}
