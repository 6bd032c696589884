//! The toxicity service: vectorizer, classifier and substitution table
//! assembled once at startup and shared read-only by every request.

use eyre::{bail, eyre, Result};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, OnnxClassifier};
use crate::highlight::{annotate, Annotation};
use crate::replacements::SubstitutionTable;
use crate::vectorizer::TextVectorizer;
use crate::verdict::Verdict;
use crate::vocab::Vocabulary;
use crate::AppConfig;

pub const BLANK_WARNING: &str = "⚠ Please enter some text.";
pub const FAILURE_MESSAGE: &str = "Inference failed. Please try again.";

/// Result of analyzing one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis {
    /// Nothing but whitespace was submitted; the model was not consulted.
    Blank,
    Scored {
        verdict: Verdict,
        annotation: Annotation,
    },
    Failed {
        reason: String,
    },
}

impl Analysis {
    /// The line shown to the user above the results.
    pub fn message(&self) -> String {
        match self {
            Self::Blank => BLANK_WARNING.to_string(),
            Self::Scored { verdict, .. } => verdict.to_string(),
            Self::Failed { .. } => FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        match self {
            Self::Scored { annotation, .. } => Some(annotation),
            _ => None,
        }
    }
}

pub struct ToxicityService {
    vectorizer: TextVectorizer,
    classifier: Arc<dyn Classifier>,
    table: Arc<SubstitutionTable>,
}

impl ToxicityService {
    pub fn new(
        vectorizer: TextVectorizer,
        classifier: Arc<dyn Classifier>,
        table: SubstitutionTable,
    ) -> Self {
        Self {
            vectorizer,
            classifier,
            table: Arc::new(table),
        }
    }

    /// Build the service from configuration: vocabulary, model, then table.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let vocab_path = config.vocab_path();
        let vocab = Vocabulary::load(&vocab_path, config.max_tokens())?;
        info!(path = %vocab_path.display(), size = vocab.len(), "loaded vocabulary");

        let model_path = config.model_path();
        let classifier = OnnxClassifier::load(&model_path)?;
        let width = classifier.meta().input_width();
        if width != config.sequence_length() {
            warn!(
                configured = config.sequence_length(),
                model = width,
                "sequence_length disagrees with model input_shape, using the model's"
            );
        }
        info!(path = %model_path.display(), hash = %classifier.model_hash(), "loaded model");

        let table = match config.replacements_path() {
            Some(path) => {
                let table = SubstitutionTable::load(&path)?;
                info!(path = %path.display(), entries = table.len(), "loaded replacements");
                table
            }
            None => SubstitutionTable::builtin(),
        };

        let vectorizer = TextVectorizer::new(&vocab, width);
        Ok(Self::new(vectorizer, Arc::new(classifier), table))
    }

    pub fn table(&self) -> &SubstitutionTable {
        &self.table
    }

    pub fn vocab_size(&self) -> usize {
        self.vectorizer.vocab_size()
    }

    pub fn model_hash(&self) -> String {
        self.classifier.model_hash()
    }

    /// Vectorize and classify non-blank text.
    pub fn score(&self, text: &str) -> Result<Verdict> {
        let ids = self.vectorizer.encode(text);
        let probability = self.classifier.predict(&ids)?;
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            bail!("classifier returned invalid probability {probability}");
        }
        Ok(Verdict::from_probability(probability))
    }

    pub fn annotate(&self, text: &str) -> Annotation {
        annotate(text, &self.table)
    }

    /// Full per-submission pipeline. Model errors and panics inside the
    /// classifier come back as [`Analysis::Failed`].
    pub fn analyze(&self, text: &str) -> Analysis {
        if text.trim().is_empty() {
            return Analysis::Blank;
        }

        let scored = panic::catch_unwind(AssertUnwindSafe(|| self.score(text)))
            .unwrap_or_else(|_| Err(eyre!("classifier panicked")));

        match scored {
            Ok(verdict) => {
                let annotation = self.annotate(text);
                debug!(
                    label = verdict.label.as_str(),
                    confidence = verdict.confidence,
                    flagged = annotation.flagged_count(),
                    "analyzed submission"
                );
                Analysis::Scored {
                    verdict,
                    annotation,
                }
            }
            Err(e) => {
                warn!(error = %e, "inference failed");
                Analysis::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
