//! Vocabulary loading for the text vectorizer.

use eyre::{Result, WrapErr};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Default cap on the number of vocabulary entries.
pub const DEFAULT_MAX_TOKENS: usize = 20_000;

/// Ordered list of distinct tokens, capped at a maximum size.
///
/// Order is first occurrence in the source. Truncation happens by position
/// after deduplication, never by frequency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    tokens: Vec<String>,
}

impl Vocabulary {
    /// Read a newline-delimited token file.
    pub fn load(path: &Path, max_tokens: usize) -> Result<Self> {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read vocabulary file {}", path.display()))?;
        Ok(Self::from_tokens(content.lines(), max_tokens))
    }

    pub fn from_tokens<I, S>(tokens: I, max_tokens: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for token in tokens {
            let token = token.as_ref();
            if seen.insert(token.to_string()) {
                unique.push(token.to_string());
            }
        }
        unique.truncate(max_tokens);
        Self { tokens: unique }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let vocab = Vocabulary::from_tokens(["the", "cat", "the", "sat", "cat", "on"], 100);
        assert_eq!(vocab.tokens(), &["the", "cat", "sat", "on"]);
    }

    #[test]
    fn test_truncates_after_dedup() {
        let vocab = Vocabulary::from_tokens(["a", "a", "b", "a", "c", "d"], 3);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.tokens(), &["a", "b", "c"]);
    }

    #[test]
    fn test_empty_source() {
        let vocab = Vocabulary::from_tokens(Vec::<String>::new(), DEFAULT_MAX_TOKENS);
        assert!(vocab.is_empty());
        assert_eq!(vocab.get(0), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\n[UNK]\nyou\nfool\nyou\r\nhate\n").unwrap();

        let vocab = Vocabulary::load(file.path(), DEFAULT_MAX_TOKENS).unwrap();
        assert_eq!(vocab.tokens(), &["", "[UNK]", "you", "fool", "hate"]);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = Vocabulary::load(&dir.path().join("missing.txt"), 10).unwrap_err();
        assert!(format!("{err:?}").contains("vocabulary"));
    }
}
