//! Flagging of substitutable words and suggestion collection.
//!
//! The input is split on whitespace. Each token is normalized (lowercased,
//! with `.`, `,`, `!` and `?` trimmed from both ends) and looked up in the
//! [`SubstitutionTable`]. Only that punctuation set is trimmed, so `hate;`
//! does not match `hate`.

use serde::Serialize;

use crate::replacements::SubstitutionTable;

/// Characters trimmed from token edges before lookup.
pub const EDGE_PUNCTUATION: &[char] = &['.', ',', '!', '?'];

/// One whitespace-delimited token of the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    pub flagged: bool,
}

/// A flagged token as it appeared in the input, with its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub original: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub segments: Vec<Segment>,
    pub suggestions: Vec<Suggestion>,
}

impl Annotation {
    /// Segments joined by single spaces.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn flagged_count(&self) -> usize {
        self.segments.iter().filter(|s| s.flagged).count()
    }

    pub fn suggestion_for(&self, original: &str) -> Option<&str> {
        self.suggestions
            .iter()
            .find(|s| s.original == original)
            .map(|s| s.replacement.as_str())
    }
}

/// Lookup key for a token: lowercase, edge punctuation trimmed.
pub fn normalize_token(token: &str) -> String {
    token.to_lowercase().trim_matches(EDGE_PUNCTUATION).to_string()
}

/// Annotate `text` against `table`.
///
/// Suggestions are keyed by the original token, so `Fuck` and `fuck,` give
/// two entries. A token repeated verbatim keeps a single entry at its first
/// position.
pub fn annotate(text: &str, table: &SubstitutionTable) -> Annotation {
    let mut annotation = Annotation::default();

    for token in text.split_whitespace() {
        let key = normalize_token(token);
        match table.lookup(&key) {
            Some(replacement) => {
                annotation.segments.push(Segment {
                    text: token.to_string(),
                    flagged: true,
                });
                if annotation.suggestion_for(token).is_none() {
                    annotation.suggestions.push(Suggestion {
                        original: token.to_string(),
                        replacement: replacement.to_string(),
                    });
                }
            }
            None => annotation.segments.push(Segment {
                text: token.to_string(),
                flagged: false,
            }),
        }
    }

    annotation
}
