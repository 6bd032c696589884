//! Toxicity classifier: token ids in, probability out.
//!
//! [`OnnxClassifier`] runs an ONNX export of the trained network. The model
//! file is accompanied by a `<stem>.meta.toml` sidecar describing the input
//! shape and the fixed-point scale of the output.

use eyre::{bail, eyre, Result, WrapErr};
use onnx_tracer::tensor::Tensor;
use serde::Deserialize;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::hash_bytes;

/// Anything that can score a vectorized submission.
pub trait Classifier: Send + Sync {
    /// Probability that the text behind `ids` is toxic, in `[0, 1]`.
    fn predict(&self, ids: &[i32]) -> Result<f64>;

    /// Stable identifier of the underlying model.
    fn model_hash(&self) -> String;
}

// ---------------------------------------------------------------------------
// Model metadata
// ---------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ClassifierMeta {
    pub input_shape: Vec<usize>,
    /// Output fixed-point scale exponent; the probability is `out / 2^scale`.
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// Which element of the output tensor holds the toxic score.
    #[serde(default)]
    pub output_index: usize,
}

fn default_scale() -> u32 {
    7
}

impl ClassifierMeta {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| eyre!("failed to read meta file {}: {}", path.display(), e))?;
        let meta: Self = toml::from_str(&content)
            .map_err(|e| eyre!("failed to parse meta file {}: {}", path.display(), e))?;
        if meta.input_shape.is_empty() || meta.input_shape.contains(&0) {
            bail!("meta file {} has an invalid input_shape {:?}", path.display(), meta.input_shape);
        }
        Ok(meta)
    }

    /// Sequence length expected by the model.
    pub fn input_width(&self) -> usize {
        self.input_shape.last().copied().unwrap_or(0)
    }

    /// Divisor turning a fixed-point output into a real value.
    pub fn divisor(&self) -> f64 {
        f64::from(1u32 << self.scale.min(30))
    }
}

/// Sidecar path for a model file: `toxicity.onnx` → `toxicity.meta.toml`.
pub fn meta_path_for(model_path: &Path) -> PathBuf {
    model_path.with_extension("meta.toml")
}

// ---------------------------------------------------------------------------
// ONNX classifier
// ---------------------------------------------------------------------------

pub struct OnnxClassifier {
    path: PathBuf,
    meta: ClassifierMeta,
    hash: String,
}

impl OnnxClassifier {
    /// Load the model at `path` and its sidecar. Fails if either is missing
    /// or the model cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .wrap_err_with(|| format!("failed to read model file {}", path.display()))?;
        let meta_path = meta_path_for(path);
        if !meta_path.is_file() {
            bail!(
                "model found at '{}' but no .meta.toml sidecar. Create {}",
                path.display(),
                meta_path.display()
            );
        }
        let meta = ClassifierMeta::load(&meta_path)?;

        // The tracer panics on malformed graphs; surface that as a load error.
        parse_model(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            meta,
            hash: hash_bytes(&bytes),
        })
    }

    pub fn meta(&self) -> &ClassifierMeta {
        &self.meta
    }
}

fn parse_model(path: &Path) -> Result<onnx_tracer::graph::model::Model> {
    let owned = path.to_path_buf();
    panic::catch_unwind(AssertUnwindSafe(|| onnx_tracer::model(&owned)))
        .map_err(|_| eyre!("failed to load ONNX model {}", path.display()))
}

impl Classifier for OnnxClassifier {
    fn predict(&self, ids: &[i32]) -> Result<f64> {
        let width = self.meta.input_width();
        let mut input_vec = ids.to_vec();
        input_vec.resize(width, 0);

        let input = Tensor::new(Some(&input_vec), &[1, width])
            .map_err(|e| eyre!("tensor error: {:?}", e))?;

        let model = parse_model(&self.path)?;
        let result = panic::catch_unwind(AssertUnwindSafe(|| model.forward(&[input])))
            .map_err(|_| eyre!("forward panicked"))?
            .map_err(|e| eyre!("forward error: {}", e))?;

        let data = &result
            .outputs
            .first()
            .ok_or_else(|| eyre!("model produced no outputs"))?
            .inner;
        let raw = *data.get(self.meta.output_index).ok_or_else(|| {
            eyre!(
                "output index {} out of range for output of length {}",
                self.meta.output_index,
                data.len()
            )
        })?;

        let probability = f64::from(raw) / self.meta.divisor();
        debug!(raw, probability, "model output");
        if !(0.0..=1.0).contains(&probability) {
            warn!(probability, "model output outside [0, 1], clamping (possible model issue)");
        }
        Ok(probability.clamp(0.0, 1.0))
    }

    fn model_hash(&self) -> String {
        self.hash.clone()
    }
}
