//! Text to token-id encoding for the classifier input.
//!
//! Mirrors an integer-mode text vectorization layer: lowercase, strip ASCII
//! punctuation, split on whitespace, look up each word, then pad or truncate
//! to a fixed sequence length.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::vocab::Vocabulary;

pub const DEFAULT_SEQUENCE_LENGTH: usize = 1800;

/// Id used for padding positions.
pub const PAD_ID: i32 = 0;
/// Id used for words not present in the vocabulary.
pub const OOV_ID: i32 = 1;

const PAD_TOKEN: &str = "";
const OOV_TOKEN: &str = "[UNK]";

static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r##"[!"#$%&()*+,\-./:;<=>?@\[\\\]^_`{|}~']"##).unwrap());

#[derive(Debug, Clone)]
pub struct TextVectorizer {
    ids: HashMap<String, i32>,
    sequence_length: usize,
}

impl TextVectorizer {
    /// Build a vectorizer over `vocab`.
    ///
    /// A leading padding entry (`""`) and out-of-vocabulary entry (`[UNK]`)
    /// are treated as the reserved ids 0 and 1; every other token gets the
    /// next id from 2 upward in vocabulary order.
    pub fn new(vocab: &Vocabulary, sequence_length: usize) -> Self {
        let mut tokens = vocab.tokens();
        if tokens.first().map(String::as_str) == Some(PAD_TOKEN) {
            tokens = &tokens[1..];
        }
        if tokens.first().map(String::as_str) == Some(OOV_TOKEN) {
            tokens = &tokens[1..];
        }

        let ids = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| (token.clone(), i as i32 + 2))
            .collect();

        Self {
            ids,
            sequence_length,
        }
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Number of distinct ids the vectorizer can emit, reserved ids included.
    pub fn vocab_size(&self) -> usize {
        self.ids.len() + 2
    }

    pub fn standardize(text: &str) -> String {
        PUNCTUATION_RE.replace_all(&text.to_lowercase(), "").into_owned()
    }

    pub fn encode(&self, text: &str) -> Vec<i32> {
        let standardized = Self::standardize(text);
        let mut out: Vec<i32> = standardized
            .split_whitespace()
            .take(self.sequence_length)
            .map(|word| self.ids.get(word).copied().unwrap_or(OOV_ID))
            .collect();
        out.resize(self.sequence_length, PAD_ID);
        out
    }
}
