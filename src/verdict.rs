//! Probability → human-readable verdict.

use serde::Serialize;
use std::fmt;

/// Probabilities strictly above this are toxic; exactly 0.5 is not.
pub const TOXIC_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Toxic,
    NotToxic,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Toxic => "Toxic",
            Self::NotToxic => "Not Toxic",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub label: Label,
    /// Raw model output in `[0, 1]`.
    pub probability: f64,
    /// Confidence in the label, as a percentage with two decimals.
    pub confidence: f64,
}

impl Verdict {
    /// `Toxic` reports `round(p * 100, 2)`. `Not Toxic` reports the
    /// complement of that, rounded to two decimals again so float noise
    /// such as `12.469999999999999` never reaches the page.
    pub fn from_probability(probability: f64) -> Self {
        let pct = round2(probability * 100.0);
        if probability > TOXIC_THRESHOLD {
            Self {
                label: Label::Toxic,
                probability,
                confidence: pct,
            }
        } else {
            Self {
                label: Label::NotToxic,
                probability,
                confidence: round2(100.0 - pct),
            }
        }
    }

    pub fn is_toxic(&self) -> bool {
        self.label == Label::Toxic
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}%)", self.label, format_percent(self.confidence))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Two decimals at most, one at least: `50.0`, `87.5`, `87.53`.
fn format_percent(value: f64) -> String {
    let s = format!("{value:.2}");
    let trimmed = s.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}
