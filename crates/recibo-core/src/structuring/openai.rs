//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompt::{build_system_prompt, build_user_prompt};
use super::{parse_candidate, FieldStructurer};
use crate::error::{ConfigError, StructuringError};
use crate::models::config::LlmConfig;
use crate::models::invoice::CandidateFields;
use crate::normalize::KeyResolver;
use crate::retry::{classify_status, classify_transport, ErrorClass};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Structures invoice text with a chat completion model in JSON mode.
pub struct OpenAiStructurer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    max_input_chars: usize,
    system_prompt: String,
    keys: KeyResolver,
}

impl OpenAiStructurer {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_input_chars: config.max_input_chars,
            system_prompt: build_system_prompt(),
            keys: KeyResolver::default(),
        })
    }

    /// Use configured key aliases when checking replies for required fields.
    pub fn with_keys(mut self, keys: KeyResolver) -> Self {
        self.keys = keys;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, text: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(self.system_prompt.clone()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(build_user_prompt(text, self.max_input_chars)),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        }
    }
}

#[async_trait]
impl FieldStructurer for OpenAiStructurer {
    async fn structure(&self, text: &str) -> Result<CandidateFields, StructuringError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(text))
            .send()
            .await
            .map_err(|e| {
                let message = format!("chat completion: {}", e);
                match classify_transport(&e) {
                    ErrorClass::Transient => StructuringError::Transient(message),
                    ErrorClass::Permanent => StructuringError::Permanent(message),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            let message = format!("chat completion returned {}: {}", status, body.trim());
            return Err(match classify_status(status) {
                ErrorClass::Transient => StructuringError::Transient(message),
                ErrorClass::Permanent => StructuringError::Permanent(message),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| StructuringError::BadShape(format!("unexpected response body: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| StructuringError::BadShape("empty completion".to_string()))?;

        debug!(model = %self.model, chars = content.len(), "Received structured response");
        parse_candidate(&content, &self.keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let config = LlmConfig {
            max_input_chars: 5,
            ..LlmConfig::default()
        };
        let client = OpenAiStructurer::new(&config, "sk-test").unwrap();
        let json = serde_json::to_value(client.request("Factura ENSA")).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json["messages"][1]["content"]
            .as_str()
            .unwrap()
            .ends_with("\n\nFactu"));
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"nis\": \"1\"}"}}]}"#;
        let chat: ChatResponse = serde_json::from_str(body).unwrap();
        let content = chat.choices[0].message.content.as_deref().unwrap();
        assert!(parse_candidate(content, &KeyResolver::default()).is_ok());
    }
}
