//! Error types for MedShop.
//!
//! Defines the main error enum used throughout the service.

use thiserror::Error;

/// Main error type for MedShop operations.
#[derive(Error, Debug, Clone)]
pub enum MedshopError {
    /// Data source unreachable or misconfigured (host down, auth failed, bad URL).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution errors (syntax errors, missing tables, timeouts).
    #[error("Query error: {0}")]
    Query(String),

    /// Language-model failures that will not improve on retry, or unusable model output.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Transient language-model failures (timeouts, rate limits, 5xx).
    #[error("LLM service unavailable: {0}")]
    LlmUnavailable(String),

    /// Configuration errors (invalid config file, missing API key, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied input the pipeline cannot work with.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MedshopError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a generation error with the given message.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Creates a transient LLM error with the given message.
    pub fn llm_unavailable(msg: impl Into<String>) -> Self {
        Self::LlmUnavailable(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid input error with the given message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LlmUnavailable(_))
    }

    /// Folds transient LLM failures into `Generation` once no more retries will happen.
    pub fn into_generation(self) -> Self {
        match self {
            Self::LlmUnavailable(msg) => Self::Generation(msg),
            other => other,
        }
    }

    /// Returns the message without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Connection(msg)
            | Self::Query(msg)
            | Self::Generation(msg)
            | Self::LlmUnavailable(msg)
            | Self::Config(msg)
            | Self::InvalidInput(msg)
            | Self::Internal(msg) => msg,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Generation(_) => "Generation Error",
            Self::LlmUnavailable(_) => "LLM Unavailable",
            Self::Config(_) => "Configuration Error",
            Self::InvalidInput(_) => "Invalid Input",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using MedshopError.
pub type Result<T> = std::result::Result<T, MedshopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_connection() {
        let err = MedshopError::connection("Cannot connect to localhost:5432");
        assert_eq!(
            err.to_string(),
            "Connection error: Cannot connect to localhost:5432"
        );
        assert_eq!(err.category(), "Connection Error");
    }

    #[test]
    fn test_error_display_query() {
        let err = MedshopError::query("no such column: quantiy");
        assert_eq!(err.to_string(), "Query error: no such column: quantiy");
        assert_eq!(err.category(), "Query Error");
    }

    #[test]
    fn test_error_display_generation() {
        let err = MedshopError::generation("model returned an empty reply");
        assert_eq!(
            err.to_string(),
            "Generation error: model returned an empty reply"
        );
        assert_eq!(err.category(), "Generation Error");
    }

    #[test]
    fn test_error_display_config() {
        let err = MedshopError::config("OPENAI_API_KEY is not set");
        assert_eq!(
            err.to_string(),
            "Configuration error: OPENAI_API_KEY is not set"
        );
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(MedshopError::llm_unavailable("rate limited").is_retryable());
        assert!(!MedshopError::generation("bad key").is_retryable());
        assert!(!MedshopError::connection("down").is_retryable());
    }

    #[test]
    fn test_into_generation_folds_transient() {
        let err = MedshopError::llm_unavailable("timed out").into_generation();
        assert!(matches!(err, MedshopError::Generation(ref m) if m == "timed out"));

        let err = MedshopError::connection("down").into_generation();
        assert!(matches!(err, MedshopError::Connection(_)));
    }

    #[test]
    fn test_detail_drops_prefix() {
        let err = MedshopError::query("no such table: patients");
        assert_eq!(err.detail(), "no such table: patients");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MedshopError>();
    }
}
