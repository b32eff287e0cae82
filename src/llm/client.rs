/// Chat-completions HTTP client implementation.
///
/// This module provides `ChatClient` for making synchronous requests to an
/// OpenAI-compatible `/v1/chat/completions` endpoint, along with error types
/// and a builder for configuration.
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Sampling temperature for classification requests; near-deterministic decoding.
pub const CLASSIFICATION_TEMPERATURE: f64 = 0.1;

/// Errors that can occur when talking to the chat-completions endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request did not complete before its deadline
    #[error("Request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// HTTP errors with status code
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Well-formed response without a usable answer
    #[error("API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Required configuration value was not provided
    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
}

/// Builder for constructing `ChatClient` instances.
///
/// # Examples
///
/// ```
/// use qcoder::llm::ChatClientBuilder;
///
/// let client = ChatClientBuilder::new()
///     .base_url("https://api.openai.com")
///     .api_key("sk-test")
///     .model("gpt-4o-mini")
///     .build()
///     .expect("Failed to create client");
/// assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
/// ```
#[derive(Debug, Default)]
pub struct ChatClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
}

impl ChatClientBuilder {
    /// Creates a new `ChatClientBuilder` with nothing configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API base URL.
    ///
    /// Accepts a bare host (`https://api.example.com`), a `/v1` base, or the
    /// full `/v1/chat/completions` URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the bearer credential.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model name sent with every request.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builds the `ChatClient`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingSetting` if the base URL, API key, or model is
    /// missing or blank, `LlmError::InvalidUrl` if the base URL does not parse,
    /// and `LlmError::Network` if the HTTP client cannot be constructed.
    pub fn build(self) -> Result<ChatClient, LlmError> {
        let base_url = non_blank(self.base_url).ok_or(LlmError::MissingSetting("base_url"))?;
        let api_key = non_blank(self.api_key).ok_or(LlmError::MissingSetting("api_key"))?;
        let model = non_blank(self.model).ok_or(LlmError::MissingSetting("model"))?;

        let endpoint = completions_endpoint(&base_url);
        reqwest::Url::parse(&endpoint)
            .map_err(|e| LlmError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        // Per-request timeouts are applied in `complete`; this only bounds connecting
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(LlmError::Network)?;

        Ok(ChatClient {
            client,
            endpoint,
            api_key,
            model,
        })
    }
}

/// Synchronous client for an OpenAI-compatible chat-completions endpoint.
///
/// Should be constructed using `ChatClientBuilder`.
pub struct ChatClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Trait for chat-completion operations.
///
/// This is the seam the classifier depends on, so tests can substitute a mock.
pub trait ChatCompletion: Send + Sync {
    /// Sends `prompt` as the sole message and returns the raw reply text.
    ///
    /// # Errors
    ///
    /// Returns `LlmError` on transport failure, non-success status, malformed
    /// payload, or when `timeout` elapses first.
    fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, LlmError>;
}

impl ChatClient {
    /// Returns the fully resolved chat-completions URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the model name configured for this client.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatCompletion for ChatClient {
    fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, LlmError> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "system", "content": prompt }],
            "temperature": CLASSIFICATION_TEMPERATURE,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request_body)
            .timeout(timeout)
            .send()
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(|e| transport_error(e, timeout))?;
        parse_reply(&body)
    }
}

/// Resolves the chat-completions URL from a configured base.
fn completions_endpoint(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout(timeout)
    } else {
        LlmError::Network(error)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Extracts the first choice's message content from a completion payload.
fn parse_reply(body: &str) -> Result<String, LlmError> {
    let response: CompletionResponse =
        serde_json::from_str(body).map_err(LlmError::Serialization)?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::Api {
            message: "Missing 'choices[0].message.content' in API response".to_string(),
        })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
