//! LLM integration for MedShop.
//!
//! Provides the client trait, an OpenAI-compatible implementation, a retry
//! wrapper, deterministic mocks, and the prompts and parsing used by the pipeline.

pub mod factory;
pub mod mock;
pub mod openai;
pub mod parser;
pub mod prompt;
pub mod retry;
pub mod types;

pub use factory::create_client;
pub use mock::{FlakyLlmClient, MockLlmClient};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use parser::{extract_sql, fenced_sql};
pub use prompt::{build_answer_messages, build_generation_messages, build_generation_prompt};
pub use retry::{RetryPolicy, RetryingClient};
pub use types::{Message, Role};

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::Result;

/// Trait for LLM clients that can generate completions.
///
/// Implementations must be thread-safe (Send + Sync): one client serves every request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a completion for the given messages.
    ///
    /// Transient failures are reported as `LlmUnavailable`, everything else as `Generation`.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// OpenAI or any compatible endpoint
    #[default]
    OpenAi,
    /// Mock client for testing (no API key required)
    Mock,
}

impl LlmProvider {
    /// Returns the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
