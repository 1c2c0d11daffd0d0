//! LLMWhisperer v2 client: submit, poll, retrieve.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::DocumentExtractor;
use crate::error::{ConfigError, ExtractionError};
use crate::models::config::OcrConfig;
use crate::retry::{classify_status, classify_transport, ErrorClass};

const API_KEY_HEADER: &str = "unstract-key";

/// Client for the LLMWhisperer text extraction API.
pub struct WhispererClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    mode: String,
    output_mode: String,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    whisper_hash: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    result_text: String,
}

/// Account usage reported by the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub subscription_plan: Option<String>,
    #[serde(default)]
    pub current_page_count: Option<u64>,
    #[serde(default)]
    pub today_page_count: Option<u64>,
    #[serde(default)]
    pub daily_quota: Option<i64>,
    #[serde(default)]
    pub monthly_quota: Option<i64>,
    #[serde(default)]
    pub overage_page_count: Option<u64>,
}

/// What one status poll tells us.
#[derive(Debug, PartialEq, Eq)]
enum PollState {
    Pending,
    Ready,
    Failed(String),
}

impl StatusResponse {
    fn state(&self) -> PollState {
        match self.status.as_str() {
            "processed" => PollState::Ready,
            "error" | "failed" => PollState::Failed(
                self.message
                    .clone()
                    .unwrap_or_else(|| "service reported an error".to_string()),
            ),
            _ => PollState::Pending,
        }
    }
}

impl WhispererClient {
    /// Create a client from the OCR section of the configuration.
    pub fn new(config: &OcrConfig, api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            mode: config.mode.clone(),
            output_mode: config.output_mode.clone(),
            poll_interval: config.poll_interval(),
            max_polls: config.max_polls.max(1),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn submit(&self, filename: &str, pdf: &[u8]) -> Result<String, ExtractionError> {
        let response = self
            .http
            .post(self.url("whisper"))
            .header(API_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .query(&[
                ("mode", self.mode.as_str()),
                ("output_mode", self.output_mode.as_str()),
                ("file_name", filename),
            ])
            .body(pdf.to_vec())
            .send()
            .await
            .map_err(|e| transport_error("whisper submit", e))?;

        let response = check_status("whisper submit", response).await?;
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Permanent(format!("unexpected submit response: {}", e)))?;

        debug!(whisper_hash = %body.whisper_hash, "Submitted {} to LLMWhisperer", filename);
        Ok(body.whisper_hash)
    }

    async fn status(&self, whisper_hash: &str) -> Result<StatusResponse, ExtractionError> {
        let response = self
            .http
            .get(self.url("whisper-status"))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("whisper_hash", whisper_hash)])
            .send()
            .await
            .map_err(|e| transport_error("whisper status", e))?;

        let response = check_status("whisper status", response).await?;
        response
            .json()
            .await
            .map_err(|e| ExtractionError::Permanent(format!("unexpected status response: {}", e)))
    }

    async fn retrieve(&self, whisper_hash: &str) -> Result<String, ExtractionError> {
        let response = self
            .http
            .get(self.url("whisper-retrieve"))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("whisper_hash", whisper_hash)])
            .send()
            .await
            .map_err(|e| transport_error("whisper retrieve", e))?;

        let response = check_status("whisper retrieve", response).await?;
        let body: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Permanent(format!("unexpected retrieve response: {}", e)))?;

        Ok(body.result_text)
    }

    /// Query account usage. A 401 here means the API key is invalid.
    pub async fn usage(&self) -> Result<UsageInfo, ExtractionError> {
        let response = self
            .http
            .get(self.url("get-usage-info"))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error("usage info", e))?;

        let response = check_status("usage info", response).await?;
        response
            .json()
            .await
            .map_err(|e| ExtractionError::Permanent(format!("unexpected usage response: {}", e)))
    }
}

#[async_trait]
impl DocumentExtractor for WhispererClient {
    async fn extract(&self, filename: &str, pdf: &[u8]) -> Result<String, ExtractionError> {
        let whisper_hash = self.submit(filename, pdf).await?;

        for poll in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let status = self.status(&whisper_hash).await?;
            trace!(poll, status = %status.status, "Polled LLMWhisperer");

            match status.state() {
                PollState::Pending => continue,
                PollState::Failed(message) => {
                    return Err(ExtractionError::Permanent(format!(
                        "LLMWhisperer could not process {}: {}",
                        filename, message
                    )));
                }
                PollState::Ready => {
                    let text = self.retrieve(&whisper_hash).await?;
                    info!(chars = text.len(), polls = poll, "Extracted text from {}", filename);
                    return Ok(text);
                }
            }
        }

        Err(ExtractionError::Transient(format!(
            "{} still processing after {} polls",
            filename, self.max_polls
        )))
    }
}

fn transport_error(context: &str, err: reqwest::Error) -> ExtractionError {
    let message = format!("{}: {}", context, err);
    match classify_transport(&err) {
        ErrorClass::Transient => ExtractionError::Transient(message),
        ErrorClass::Permanent => ExtractionError::Permanent(message),
    }
}

async fn check_status(
    context: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ExtractionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    let message = format!("{} returned {}: {}", context, status, body.trim());

    Err(match classify_status(status) {
        ErrorClass::Transient => ExtractionError::Transient(message),
        ErrorClass::Permanent => ExtractionError::Permanent(message),
    })
}
