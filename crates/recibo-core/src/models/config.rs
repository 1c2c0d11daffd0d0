//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Main configuration for the recibo pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Document extraction (OCR) service.
    pub ocr: OcrConfig,

    /// Field structuring (LLM) service.
    pub llm: LlmConfig,

    /// Batch limits.
    pub batch: BatchConfig,

    /// Retry policy for both services.
    pub retry: RetryConfig,

    /// Record normalization rules.
    pub normalization: NormalizationConfig,

    /// Spreadsheet output.
    pub export: ExportConfig,
}

/// LLMWhisperer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// API base URL (v2).
    pub base_url: String,

    /// Processing mode.
    pub mode: String,

    /// Output mode.
    pub output_mode: String,

    /// Upper bound for one extraction attempt, including polling.
    pub timeout_secs: u64,

    /// Delay between status polls.
    pub poll_interval_ms: u64,

    /// Maximum number of status polls before giving up.
    pub max_polls: u32,

    /// Minimum extracted characters for a document to count as readable.
    pub min_text_chars: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            base_url: "https://llmwhisperer-api.us-central.unstract.com/api/v2".to_string(),
            mode: "form".to_string(),
            output_mode: "layout_preserving".to_string(),
            timeout_secs: 300,
            poll_interval_ms: 2000,
            max_polls: 150,
            min_text_chars: 50,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// OpenAI-compatible chat completion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL.
    pub base_url: String,

    /// Model name (overridden by `OPENAI_MODEL`).
    pub model: String,

    /// Sampling temperature.
    pub temperature: f64,

    /// Maximum completion tokens.
    pub max_tokens: u32,

    /// Upper bound for one request.
    pub timeout_secs: u64,

    /// Extracted text beyond this many characters is cut before prompting.
    pub max_input_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: 120,
            max_input_chars: 48_000,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Batch limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Largest accepted batch.
    pub max_files: usize,

    /// Largest accepted PDF in bytes.
    pub max_pdf_bytes: usize,

    /// Files processed at the same time (clamped to 1..=8).
    pub max_concurrency: usize,
}

pub const MAX_CONCURRENCY: usize = 8;

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_files: 100,
            max_pdf_bytes: 20 * 1024 * 1024,
            max_concurrency: 3,
        }
    }
}

impl BatchConfig {
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per call, including the first.
    pub max_attempts: u32,

    pub initial_backoff_ms: u64,

    pub max_backoff_ms: u64,

    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 16_000,
            multiplier: 2.0,
        }
    }
}

/// Record normalization rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Currency filled in when the invoice does not state one.
    pub default_currency: String,

    /// Defaults for optional fields, by canonical key.
    pub defaults: BTreeMap<String, String>,

    /// Extra response keys mapped to canonical keys.
    pub aliases: BTreeMap<String, String>,

    /// Sector correction rule.
    pub sector_rule: SectorRule,

    /// Known sector labels, in their canonical spelling.
    pub sector_labels: Vec<String>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            default_currency: "PAB".to_string(),
            defaults: BTreeMap::new(),
            aliases: BTreeMap::new(),
            sector_rule: SectorRule::default(),
            sector_labels: vec![
                "Residencial".to_string(),
                "No Residencial".to_string(),
                "Comercial".to_string(),
                "Industrial".to_string(),
            ],
        }
    }
}

/// How the sector is recovered when the model put it under `tipo_consumo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorRule {
    /// Copy `tipo_consumo` into an absent `sector`.
    pub promote_consumption_type: bool,

    /// Only copy values that match a known sector label.
    pub require_known_label: bool,
}

impl Default for SectorRule {
    fn default() -> Self {
        Self {
            promote_consumption_type: true,
            require_known_label: true,
        }
    }
}

/// Which workbooks to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportSelection {
    Consolidated,
    Individual,
    Both,
}

/// Spreadsheet output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory for generated workbooks.
    pub output_dir: PathBuf,

    pub mode: ExportSelection,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            mode: ExportSelection::Consolidated,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                key: "retry.multiplier".to_string(),
                reason: "must be at least 1.0".to_string(),
            });
        }
        if self.batch.max_files == 0 {
            return Err(ConfigError::Invalid {
                key: "batch.max_files".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        for target in self.normalization.aliases.values() {
            if crate::models::invoice::InvoiceField::from_key(target).is_none() {
                return Err(ConfigError::Invalid {
                    key: "normalization.aliases".to_string(),
                    reason: format!("unknown field {}", target),
                });
            }
        }
        Ok(())
    }

    /// Apply `OPENAI_MODEL` from the environment, if set.
    pub fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model.trim().to_string();
            }
        }
    }
}

/// API keys for the two external services.
///
/// Read from the environment (and `.env`), never from the config file.
#[derive(Clone)]
pub struct Credentials {
    pub whisperer_api_key: String,
    pub openai_api_key: String,
}

const WHISPERER_KEY_VARS: [&str; 3] = [
    "LLMWHISPERER_API_KEY",
    "WHISPERER_API_KEY",
    "LLM_WHISPERER_API_KEY",
];

const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

impl Credentials {
    /// Load `.env` if present, then read both keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read both keys through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let whisperer_api_key = WHISPERER_KEY_VARS
            .iter()
            .find_map(|name| non_empty(*name))
            .ok_or_else(|| ConfigError::MissingSecret(WHISPERER_KEY_VARS[0].to_string()))?;

        let openai_api_key = non_empty(OPENAI_KEY_VAR)
            .ok_or_else(|| ConfigError::MissingSecret(OPENAI_KEY_VAR.to_string()))?;

        Ok(Self {
            whisperer_api_key: whisperer_api_key.trim().to_string(),
            openai_api_key: openai_api_key.trim().to_string(),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("whisperer_api_key", &"***")
            .field("openai_api_key", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch.max_files, 100);
        assert_eq!(config.batch.concurrency(), 3);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.normalization.default_currency, "PAB");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"batch": {"max_concurrency": 50}}"#).unwrap();
        assert_eq!(config.batch.concurrency(), MAX_CONCURRENCY);
        assert_eq!(config.batch.max_files, 100);
        assert_eq!(config.ocr.mode, "form");
    }

    #[test]
    fn test_roundtrip_file() {
        let dir = std::env::temp_dir().join(format!("recibo-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let mut config = PipelineConfig::default();
        config.export.mode = ExportSelection::Both;
        config.save(&path).unwrap();

        let loaded = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.export.mode, ExportSelection::Both);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_validate_rejects_unknown_alias_target() {
        let mut config = PipelineConfig::default();
        config
            .normalization
            .aliases
            .insert("importe".to_string(), "no_such_field".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_aliases() {
        let env: HashMap<&str, &str> = [
            ("WHISPERER_API_KEY", "w-key"),
            ("OPENAI_API_KEY", "sk-test"),
        ]
        .into_iter()
        .collect();

        let creds = Credentials::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(creds.whisperer_api_key, "w-key");
        assert_eq!(creds.openai_api_key, "sk-test");
        assert!(!format!("{:?}", creds).contains("sk-test"));
    }

    #[test]
    fn test_credentials_missing() {
        let err = Credentials::from_lookup(|k| {
            (k == "LLMWHISPERER_API_KEY").then(|| "w".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
