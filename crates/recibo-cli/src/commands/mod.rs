//! CLI subcommands and the helpers they share.

pub mod batch;
pub mod check;
pub mod config;
pub mod process;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use recibo_core::models::batch::FileStage;
use recibo_core::{
    BatchOrchestrator, Credentials, KeyResolver, OpenAiStructurer, PipelineConfig, WhispererClient,
};
use tracing::debug;

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recibo")
        .join("config.json")
}

/// `--config` if given, else the default path.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load the pipeline configuration: the explicit file, the default file if it
/// exists, or built-in defaults. Environment overrides are applied last.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<PipelineConfig> {
    let mut config = match explicit {
        Some(path) => PipelineConfig::from_file(Path::new(path))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                debug!("Using config file {}", path.display());
                PipelineConfig::from_file(&path)?
            } else {
                PipelineConfig::default()
            }
        }
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Orchestrator wired to the real OCR and LLM services.
pub fn build_orchestrator(config: &PipelineConfig) -> anyhow::Result<BatchOrchestrator> {
    let credentials = Credentials::from_env()?;
    let extractor = WhispererClient::new(&config.ocr, credentials.whisperer_api_key)?;
    let structurer = OpenAiStructurer::new(&config.llm, credentials.openai_api_key)?
        .with_keys(KeyResolver::new(&config.normalization));
    debug!(model = structurer.model(), "Using structuring model");

    Ok(BatchOrchestrator::new(
        config,
        Arc::new(extractor),
        Arc::new(structurer),
    ))
}

pub fn stage_label(stage: &FileStage) -> &str {
    match stage {
        FileStage::Pending => "Waiting...",
        FileStage::Extracting => "Extracting text...",
        FileStage::Structuring => "Structuring fields...",
        FileStage::Normalizing => "Normalizing...",
        FileStage::Done => "Done",
        FileStage::Failed(reason) => reason,
    }
}
