//! Substitution table: flagged word → gentler replacement phrase.

use eyre::{bail, Result, WrapErr};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::highlight::EDGE_PUNCTUATION;

const BUILTIN: [(&str, &str); 23] = [
    ("fucker", "person"),
    ("fuck", "mess up"),
    ("shit", "nonsense"),
    ("kill", "defeat"),
    ("stupid", "silly"),
    ("idiot", "friend"),
    ("hate", "dislike"),
    ("dumb", "unkind"),
    ("loser", "opponent"),
    ("bastard", "stranger"),
    ("ugly", "unpleasant"),
    ("moron", "buddy"),
    ("crazy", "wild"),
    ("fool", "silly one"),
    ("trash", "bad"),
    ("jerk", "rude person"),
    ("fat", "big"),
    ("skinny", "slim"),
    ("lazy", "slow"),
    ("nonsense", "unhelpful"),
    ("hell", "trouble"),
    ("fucked", "messed up"),
    ("fucking", "messed up"),
];

/// On-disk shape of a replacements file.
#[derive(Deserialize, Debug)]
struct ReplacementsFile {
    replacements: HashMap<String, String>,
}

/// Immutable lookup table shared by every request.
///
/// Keys are stored lowercase; lookups are case-sensitive, so callers
/// normalize before asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionTable {
    entries: HashMap<String, String>,
}

impl Default for SubstitutionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SubstitutionTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Build a table from arbitrary entries, rejecting keys that could never match.
    pub fn from_entries(entries: HashMap<String, String>) -> Result<Self> {
        let issues = validate_entries(&entries);
        if !issues.is_empty() {
            bail!("invalid replacements:\n  {}", issues.join("\n  "));
        }
        Ok(Self { entries })
    }

    /// Load a TOML file with a `[replacements]` table.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read replacements file {}", path.display()))?;
        let file: ReplacementsFile = toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse replacements file {}", path.display()))?;
        Self::from_entries(file.replacements)
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entries(entries: &HashMap<String, String>) -> Vec<String> {
    let mut issues = Vec::new();
    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort();

    for key in keys {
        if key.is_empty() {
            issues.push("empty key".to_string());
            continue;
        }
        if *key != key.to_lowercase() {
            issues.push(format!("key '{key}' must be lowercase"));
        }
        if key.chars().any(char::is_whitespace) {
            issues.push(format!("key '{key}' must be a single word"));
        }
        if key.starts_with(EDGE_PUNCTUATION) || key.ends_with(EDGE_PUNCTUATION) {
            issues.push(format!("key '{key}' starts or ends with punctuation"));
        }
        if entries[key].trim().is_empty() {
            issues.push(format!("key '{key}' has an empty replacement"));
        }
    }

    issues
}
