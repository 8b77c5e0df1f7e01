//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use std::sync::Arc;

use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{MedshopError, Result};
use crate::llm::{
    LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig, RetryPolicy,
    RetryingClient,
};

/// Creates the LLM client described by `config`.
///
/// The API key comes from `config.api_key`, which the configuration loader
/// fills from `OPENAI_API_KEY`. Remote clients are wrapped in a
/// [`RetryingClient`] honouring `config.max_retries`.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let provider: LlmProvider = config.provider.parse().map_err(MedshopError::config)?;

    match provider {
        LlmProvider::OpenAi => {
            let key = config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    MedshopError::config("No API key configured. Set OPENAI_API_KEY.")
                })?;
            let client = OpenAiClient::new(OpenAiConfig::from_settings(config, key))?;
            debug!(model = client.model(), max_retries = config.max_retries, "Created OpenAI client");
            Ok(Arc::new(RetryingClient::new(
                client,
                RetryPolicy::new(config.max_retries),
            )))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}
