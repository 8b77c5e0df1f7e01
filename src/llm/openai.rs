//! OpenAI LLM client implementation.
//!
//! Implements the LlmClient trait for OpenAI's chat completions API and any
//! endpoint that speaks the same protocol.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{MedshopError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// OpenAI API base URL.
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Model to use (e.g., "gpt-3.5-turbo", "gpt-4o").
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,
}

impl OpenAiConfig {
    /// Creates a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: OPENAI_API_BASE.to_string(),
        }
    }

    /// Builds the client config from application settings and a resolved key.
    pub fn from_settings(settings: &LlmConfig, api_key: impl Into<String>) -> Self {
        let mut config = Self::new(api_key, settings.model.clone())
            .with_temperature(settings.temperature)
            .with_timeout(settings.timeout_secs);
        if let Some(base_url) = &settings.base_url {
            config = config.with_base_url(base_url.clone());
        }
        config
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Points the client at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// OpenAI LLM client.
///
/// Makes exactly one request per call; retries are layered on by
/// [`RetryingClient`](crate::llm::RetryingClient).
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    /// Creates a new OpenAI client with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedshopError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Returns the model this client requests.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Converts internal messages to OpenAI API format.
    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Maps an API error response to a transient or permanent error.
    fn parse_error(status: reqwest::StatusCode, body: &str) -> MedshopError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return MedshopError::generation("Authentication failed. Check your OPENAI_API_KEY.");
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return MedshopError::llm_unavailable("Rate limited. Please wait and try again.");
        }

        let message = match serde_json::from_str::<OpenAiErrorResponse>(body) {
            Ok(error_response) => format!("OpenAI API error: {}", error_response.error.message),
            Err(_) => format!("OpenAI API error ({}): {}", status, body),
        };

        if status.is_server_error() {
            MedshopError::llm_unavailable(message)
        } else {
            MedshopError::generation(message)
        }
    }

    /// Maps a transport error to a transient or permanent error.
    fn request_error(error: &reqwest::Error) -> MedshopError {
        if error.is_timeout() {
            MedshopError::llm_unavailable("Request timed out")
        } else if error.is_connect() {
            MedshopError::llm_unavailable("Failed to connect to OpenAI API. Check your network.")
        } else {
            MedshopError::generation(format!("Request failed: {}", error))
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            temperature: self.config.temperature,
        };

        debug!(model = %self.config.model, "OpenAI API request");

        let response = self
            .client
            .post(self.config.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::request_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MedshopError::llm_unavailable(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &body));
        }

        let response: OpenAiResponse = serde_json::from_str(&body)
            .map_err(|e| MedshopError::generation(format!("Failed to parse response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| MedshopError::generation("No response from OpenAI"))
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
