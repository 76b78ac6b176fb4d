//! OpenAI Chat Completions extractor.
//!
//! Sends the document text with the schema-bearing system prompt at
//! temperature 0 and parses the JSON object out of the reply.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::{prompt, QuoteExtractor};
use crate::schema::QuoteSchema;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiExtractor {
    http: Client,
    api_key: SecretString,
    api_url: String,
    model: String,
    max_tokens: u32,
    total_tokens: AtomicU64,
    total_calls: AtomicU64,
}

impl OpenAiExtractor {
    pub fn new(
        api_key: SecretString,
        model: Option<String>,
        api_url: Option<String>,
        max_tokens: Option<u32>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            http,
            api_key,
            api_url: api_url.unwrap_or_else(|| OPENAI_API_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            total_tokens: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
        })
    }

    fn build_request(&self, system: String, document_text: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: document_text.to_string(),
                },
            ],
        }
    }

    async fn call_api(&self, request: &ChatRequest) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&self.api_url)
                .bearer_auth(self.api_key.expose_secret())
                .json(request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse OpenAI response")?;

                        let text = body
                            .choices
                            .first()
                            .and_then(|c| c.message.as_ref())
                            .map(|m| m.content.clone())
                            .unwrap_or_default();

                        let usage = body.usage.unwrap_or_default();
                        self.total_tokens.fetch_add(usage.total_tokens, Ordering::Relaxed);
                        self.total_calls.fetch_add(1, Ordering::Relaxed);

                        return Ok(text);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, "Retryable OpenAI error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("OpenAI API error {status}: {error_text}");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "OpenAI request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "OpenAI API failed after {MAX_RETRIES} retries: {}",
            last_error.unwrap_or_default()
        )
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl QuoteExtractor for OpenAiExtractor {
    async fn extract(&self, text: &str, schema: &QuoteSchema) -> Result<Value> {
        let request = self.build_request(prompt::system_prompt(schema), text);

        debug!(model = %self.model, chars = text.len(), "OpenAI extraction");

        let response_text = self.call_api(&request).await?;
        prompt::parse_extraction(&response_text)
            .with_context(|| format!("Unusable extraction from {}", self.model))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretString {
        SecretString::new("test-key".to_string())
    }

    #[test]
    fn test_client_construction() {
        let client = OpenAiExtractor::new(key(), None, None, None).unwrap();
        assert_eq!(client.model_name(), DEFAULT_MODEL);
        assert_eq!(client.api_url, OPENAI_API_URL);
        assert_eq!(client.total_calls(), 0);
        assert_eq!(client.total_tokens(), 0);
    }

    #[test]
    fn test_client_custom_model() {
        let client = OpenAiExtractor::new(
            key(),
            Some("gpt-4-turbo".into()),
            Some("http://localhost:8080/v1/chat/completions".into()),
            Some(2048),
        )
        .unwrap();
        assert_eq!(client.model_name(), "gpt-4-turbo");
        assert_eq!(client.max_tokens, 2048);
    }

    #[test]
    fn test_request_is_deterministic_and_carries_schema() {
        let client = OpenAiExtractor::new(key(), None, None, None).unwrap();
        let schema = QuoteSchema::builtin();
        let request = client.build_request(prompt::system_prompt(&schema), "CHU quote text");
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["temperature"], serde_json::json!(0.0));
        assert_eq!(body["model"], serde_json::json!(DEFAULT_MODEL));
        assert_eq!(body["messages"][0]["role"], serde_json::json!("system"));
        assert!(body["messages"][0]["content"].as_str().unwrap().contains("general_info"));
        assert_eq!(body["messages"][1]["content"], serde_json::json!("CHU quote text"));
    }

    #[test]
    fn test_debug_output_hides_key() {
        let client = OpenAiExtractor::new(key(), None, None, None).unwrap();
        assert!(!format!("{:?}", client.api_key).contains("test-key"));
    }
}
