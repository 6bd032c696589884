//! tonecheck library: vocabulary loading, text vectorization, toxicity
//! classification, word-substitution suggestions and the web front-end.

pub mod classifier;
pub mod highlight;
pub mod render;
pub mod replacements;
pub mod server;
pub mod service;
pub mod vectorizer;
pub mod verdict;
pub mod vocab;

use eyre::{Result, WrapErr};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::{meta_path_for, ClassifierMeta};
use crate::replacements::SubstitutionTable;
use crate::vectorizer::DEFAULT_SEQUENCE_LENGTH;
use crate::vocab::DEFAULT_MAX_TOKENS;

const DEFAULT_MODEL_PATH: &str = "toxicity.onnx";
const DEFAULT_VOCAB_PATH: &str = "vectorizer_vocab.txt";
const DEFAULT_BIND: &str = "127.0.0.1:5000";
const DEFAULT_RATE_LIMIT_RPM: u32 = 60;
const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_CONCURRENT_INFERENCES: usize = 4;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Deserialize, Clone, Debug, Default)]
pub struct AppConfig {
    pub model: Option<ModelConfig>,
    pub settings: Option<SettingsConfig>,
    pub server: Option<ServerSection>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct ModelConfig {
    pub path: Option<String>,
    pub vocab: Option<String>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct SettingsConfig {
    pub max_tokens: Option<usize>,
    pub sequence_length: Option<usize>,
    pub inference_timeout_ms: Option<u64>,
    /// Optional TOML file overriding the built-in substitution table.
    pub replacements: Option<String>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct ServerSection {
    pub bind: Option<String>,
    /// Requests per minute per IP on form submissions (0 = no limit).
    pub rate_limit_rpm: Option<u32>,
    /// Model calls allowed on the blocking pool at once.
    pub max_concurrent_inferences: Option<usize>,
}

impl AppConfig {
    pub fn model_path(&self) -> PathBuf {
        expand_path(
            self.model
                .as_ref()
                .and_then(|m| m.path.as_deref())
                .unwrap_or(DEFAULT_MODEL_PATH),
        )
    }

    pub fn vocab_path(&self) -> PathBuf {
        expand_path(
            self.model
                .as_ref()
                .and_then(|m| m.vocab.as_deref())
                .unwrap_or(DEFAULT_VOCAB_PATH),
        )
    }

    pub fn replacements_path(&self) -> Option<PathBuf> {
        self.settings
            .as_ref()
            .and_then(|s| s.replacements.as_deref())
            .map(expand_path)
    }

    pub fn max_tokens(&self) -> usize {
        self.settings
            .as_ref()
            .and_then(|s| s.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn sequence_length(&self) -> usize {
        self.settings
            .as_ref()
            .and_then(|s| s.sequence_length)
            .unwrap_or(DEFAULT_SEQUENCE_LENGTH)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(
            self.settings
                .as_ref()
                .and_then(|s| s.inference_timeout_ms)
                .unwrap_or(DEFAULT_INFERENCE_TIMEOUT_MS),
        )
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let bind = self
            .server
            .as_ref()
            .and_then(|s| s.bind.as_deref())
            .unwrap_or(DEFAULT_BIND);
        bind.parse()
            .wrap_err_with(|| format!("invalid bind address '{bind}'"))
    }

    pub fn rate_limit_rpm(&self) -> u32 {
        self.server
            .as_ref()
            .and_then(|s| s.rate_limit_rpm)
            .unwrap_or(DEFAULT_RATE_LIMIT_RPM)
    }

    pub fn max_concurrent_inferences(&self) -> usize {
        self.server
            .as_ref()
            .and_then(|s| s.max_concurrent_inferences)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_INFERENCES)
    }
}

// ---------------------------------------------------------------------------
// Directory helpers
// ---------------------------------------------------------------------------

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tonecheck")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn expand_path(p: &str) -> PathBuf {
    if let Some(rest) = p.strip_prefix("~/") {
        dirs::home_dir().unwrap_or_default().join(rest)
    } else {
        PathBuf::from(p)
    }
}

/// Read and parse a config file. A missing file yields the defaults; a file
/// that exists but fails to parse is an error.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .wrap_err_with(|| format!("failed to parse config file {}", path.display()))
}

/// Validate a config, returning a list of warnings and errors.
pub fn validate_config(config: &AppConfig) -> Vec<String> {
    let mut issues = Vec::new();

    let model_path = config.model_path();
    if !model_path.is_file() {
        issues.push(format!("ERROR: model '{}' does not exist", model_path.display()));
    } else {
        let meta_path = meta_path_for(&model_path);
        match ClassifierMeta::load(&meta_path) {
            Ok(meta) if meta.input_width() != config.sequence_length() => issues.push(format!(
                "WARNING: sequence_length {} differs from model input width {}, the model's wins",
                config.sequence_length(),
                meta.input_width()
            )),
            Ok(_) => {}
            Err(e) => issues.push(format!("ERROR: {e}")),
        }
    }

    let vocab_path = config.vocab_path();
    if !vocab_path.is_file() {
        issues.push(format!("ERROR: vocabulary '{}' does not exist", vocab_path.display()));
    }

    if let Some(path) = config.replacements_path() {
        if let Err(e) = SubstitutionTable::load(&path) {
            issues.push(format!("ERROR: {e:#}"));
        }
    }

    if config.max_tokens() == 0 {
        issues.push("ERROR: max_tokens must be greater than zero".to_string());
    }
    if config.sequence_length() == 0 {
        issues.push("ERROR: sequence_length must be greater than zero".to_string());
    }
    if config.inference_timeout().is_zero() {
        issues.push("ERROR: inference_timeout_ms must be greater than zero".to_string());
    }
    if config.max_concurrent_inferences() == 0 {
        issues.push("ERROR: max_concurrent_inferences must be greater than zero".to_string());
    }
    if let Err(e) = config.bind_addr() {
        issues.push(format!("ERROR: {e:#}"));
    }

    issues
}

pub fn hash_bytes(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("sha256:{}", hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.model_path(), PathBuf::from("toxicity.onnx"));
        assert_eq!(config.vocab_path(), PathBuf::from("vectorizer_vocab.txt"));
        assert_eq!(config.max_tokens(), 20_000);
        assert_eq!(config.sequence_length(), 1800);
        assert_eq!(config.rate_limit_rpm(), 60);
        assert_eq!(config.max_concurrent_inferences(), 4);
        assert_eq!(config.bind_addr().unwrap().port(), 5000);
        assert!(config.replacements_path().is_none());
    }

    #[test]
    fn test_parse_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [model]
            path = "/srv/models/tox.onnx"

            [settings]
            max_tokens = 500
            inference_timeout_ms = 250

            [server]
            bind = "0.0.0.0:8080"
            rate_limit_rpm = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.model_path(), PathBuf::from("/srv/models/tox.onnx"));
        assert_eq!(config.max_tokens(), 500);
        assert_eq!(config.inference_timeout(), Duration::from_millis(250));
        assert_eq!(config.rate_limit_rpm(), 0);
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_load_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.toml")).unwrap();
        assert!(config.model.is_none());
    }

    #[test]
    fn test_load_malformed_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[settings\nmax_tokens = ").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_validate_reports_missing_files_and_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            model: Some(ModelConfig {
                path: Some(dir.path().join("nope.onnx").to_string_lossy().into_owned()),
                vocab: Some(dir.path().join("nope.txt").to_string_lossy().into_owned()),
            }),
            settings: Some(SettingsConfig {
                max_tokens: Some(0),
                ..Default::default()
            }),
            server: Some(ServerSection {
                bind: Some("not-an-address".into()),
                rate_limit_rpm: None,
                max_concurrent_inferences: Some(0),
            }),
        };

        let issues = validate_config(&config);
        assert!(issues.iter().any(|i| i.contains("model") && i.contains("does not exist")));
        assert!(issues.iter().any(|i| i.contains("vocabulary")));
        assert!(issues.iter().any(|i| i.contains("max_tokens")));
        assert!(issues.iter().any(|i| i.contains("invalid bind address")));
        assert!(issues.iter().any(|i| i.contains("max_concurrent_inferences")));
    }

    #[test]
    fn test_validate_sidecar_width_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("tox.onnx");
        let vocab = dir.path().join("vocab.txt");
        fs::write(&model, b"onnx").unwrap();
        fs::write(dir.path().join("tox.meta.toml"), "input_shape = [1, 200]\n").unwrap();
        fs::write(&vocab, "a\nb\n").unwrap();

        let config = AppConfig {
            model: Some(ModelConfig {
                path: Some(model.to_string_lossy().into_owned()),
                vocab: Some(vocab.to_string_lossy().into_owned()),
            }),
            ..Default::default()
        };

        let issues = validate_config(&config);
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert!(issues[0].starts_with("WARNING: sequence_length 1800"));
    }

    #[test]
    fn test_hash_bytes() {
        assert_eq!(
            hash_bytes(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
