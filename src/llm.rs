//! LLM client abstraction and the Ollama backend
//!
//! `LlmClient` is the narrow seam the pipeline stages call through: a
//! free-text completion and a schema-constrained structured completion.
//! `OllamaClient` implements it against the Ollama `/api/chat` HTTP API,
//! using the `format` field for structured output.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;

/// Default Ollama endpoint
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default request timeout for chat completions
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Provider-agnostic LLM completion interface
///
/// Stateless and safe to call concurrently across threads and within a
/// round's fan-out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Free-text completion for a single prompt
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Structured completion constrained to a JSON schema
    ///
    /// Returns the parsed JSON value; a response that is not valid JSON is
    /// a `ProviderError::Malformed`.
    async fn complete_structured(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, ProviderError>;

    /// Model identifier for logging
    fn model(&self) -> &str;
}

/// Ollama chat client
///
/// # Example
/// ```ignore
/// let client = OllamaClient::new("http://localhost:11434", "llama3.2")
///     .with_temperature(0.2);
/// let text = client.complete("Say hello").await?;
/// ```
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    client: Client,
}

impl OllamaClient {
    /// Create a client for the given endpoint and model
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.7,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client: Client::new(),
        }
    }

    /// Create from `OLLAMA_API_BASE_URL` / `OLLAMA_MODEL` environment
    /// variables, with the usual local defaults
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_API_BASE_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Self::new(base_url, model)
    }

    /// Set sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn chat(&self, prompt: &str, format: Option<&Value>) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            format,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        debug!(model = %self.model, structured = format.is_some(), "Sending chat request");

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(parsed.message.content)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let content = self.chat(prompt, None).await?;
        if content.trim().is_empty() {
            return Err(ProviderError::Malformed("empty completion".to_string()));
        }
        Ok(content)
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, ProviderError> {
        let content = self.chat(prompt, Some(schema)).await?;
        serde_json::from_str(&content)
            .map_err(|e| ProviderError::Malformed(format!("not valid JSON: {}", e)))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}
