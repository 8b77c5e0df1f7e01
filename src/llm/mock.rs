//! Mock LLM clients for testing.
//!
//! Provides deterministic responses based on input patterns, plus a client
//! that fails on demand for exercising retry behaviour.

use async_trait::async_trait;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{MedshopError, Result};
use crate::llm::prompt::{ANSWER_MARKER, RESULT_MARKER};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Clones share call history, so a test can keep a handle after giving the
/// client to a pipeline.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the last user message contains `pattern`, the mock will return `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Every message list this client has received, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Generates a mock response based on the input.
    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if input.contains(RESULT_MARKER) {
            return Self::answer_from_result(input);
        }

        Self::sql_for_question(&input_lower)
    }

    /// Canned SQL for questions about the medicines table.
    fn sql_for_question(question: &str) -> String {
        let store = Regex::new(r"store\s*#?\s*(\d+)")
            .ok()
            .and_then(|re| re.captures(question))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        if question.contains("delete") && question.contains("medicine") {
            return "```sql\nDELETE FROM medicines WHERE quantity = 0;\n```".to_string();
        }

        if question.contains("count") && question.contains("medicine") {
            return "```sql\nSELECT COUNT(*) AS medicine_count FROM medicines;\n```".to_string();
        }

        if question.contains("medicine") {
            return match store {
                Some(store_id) => format!(
                    "```sql\nSELECT name, quantity FROM medicines WHERE store_id = {} AND quantity > 0 ORDER BY name LIMIT 100;\n```",
                    store_id
                ),
                None => "```sql\nSELECT name, quantity FROM medicines ORDER BY name LIMIT 100;\n```"
                    .to_string(),
            };
        }

        "I don't understand that question. Could you please rephrase it?".to_string()
    }

    /// Restates the data rows of the result section of an answer prompt.
    fn answer_from_result(prompt: &str) -> String {
        let result = prompt
            .split_once(RESULT_MARKER)
            .map(|(_, rest)| rest)
            .and_then(|rest| rest.rsplit_once(ANSWER_MARKER).map(|(r, _)| r))
            .unwrap_or_default()
            .trim();

        if let Some(error) = result.strip_prefix("Error:") {
            return format!(
                "I could not look that up because the query failed: {}",
                error.trim()
            );
        }

        let rows: Vec<&str> = result
            .lines()
            .skip(1)
            .filter(|line| !line.starts_with('('))
            .collect();

        if rows.is_empty() {
            return "No matching records were found.".to_string();
        }

        let names: Vec<&str> = rows
            .iter()
            .map(|row| row.split(" | ").next().unwrap_or(row))
            .collect();

        format!("The results are: {}.", names.join(", "))
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let input = Self::extract_user_input(messages);
        Ok(self.mock_response(&input))
    }
}

/// LLM client that fails a fixed number of times before answering.
#[derive(Debug, Clone)]
pub struct FlakyLlmClient {
    failures: usize,
    transient: bool,
    message: String,
    response: String,
    calls: Arc<AtomicUsize>,
}

impl FlakyLlmClient {
    /// Fails `failures` times with a transient error, then returns `response`.
    pub fn transient(failures: usize, response: impl Into<String>) -> Self {
        Self {
            failures,
            transient: true,
            message: "Request timed out".to_string(),
            response: response.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always fails with a permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            failures: usize::MAX,
            transient: false,
            message: message.into(),
            response: String::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FlakyLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(if self.transient {
                MedshopError::llm_unavailable(self.message.clone())
            } else {
                MedshopError::generation(self.message.clone())
            });
        }
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::prompt::build_answer_messages;

    #[tokio::test]
    async fn test_mock_filters_by_store() {
        let client = MockLlmClient::new();
        let messages = vec![Message::user("List all medicines in stock at store 3")];

        let response = client.complete(&messages).await.unwrap();

        assert!(response.contains("FROM medicines"));
        assert!(response.contains("store_id = 3"));
    }

    #[tokio::test]
    async fn test_mock_count_medicines() {
        let client = MockLlmClient::new();
        let messages = vec![Message::user("How many medicines do we carry? Give me a count")];

        let response = client.complete(&messages).await.unwrap();

        assert!(response.contains("SELECT COUNT(*)"));
    }

    #[tokio::test]
    async fn test_mock_returns_unknown_response() {
        let client = MockLlmClient::new();
        let messages = vec![Message::user("What is the meaning of life?")];

        let response = client.complete(&messages).await.unwrap();

        assert!(response.contains("don't understand"));
    }

    #[tokio::test]
    async fn test_mock_custom_response() {
        let client = MockLlmClient::new()
            .with_response("custom query", "```sql\nSELECT custom FROM table;\n```");

        let messages = vec![Message::user("Run the custom query")];
        let response = client.complete(&messages).await.unwrap();

        assert!(response.contains("SELECT custom FROM table"));
    }

    #[tokio::test]
    async fn test_mock_answers_from_result_rows() {
        let client = MockLlmClient::new();
        let messages = build_answer_messages(
            "Which medicines are at store 3?",
            "SELECT name, quantity FROM medicines WHERE store_id = 3",
            "name | quantity\nAmoxicillin | 40\nIbuprofen | 120",
        );

        let response = client.complete(&messages).await.unwrap();

        assert_eq!(response, "The results are: Amoxicillin, Ibuprofen.");
    }

    #[tokio::test]
    async fn test_mock_answers_from_error_text() {
        let client = MockLlmClient::new();
        let messages = build_answer_messages(
            "Which medicines are at store 3?",
            "SELEC name FROM medicines",
            "Error: syntax error near \"SELEC\"",
        );

        let response = client.complete(&messages).await.unwrap();

        assert!(response.contains("query failed"));
        assert!(response.contains("syntax error"));
    }

    #[tokio::test]
    async fn test_clones_share_history() {
        let client = MockLlmClient::new();
        let handle = client.clone();

        client.complete(&[Message::user("medicines")]).await.unwrap();

        assert_eq!(handle.call_count(), 1);
        assert_eq!(handle.requests()[0][0].content, "medicines");
    }

    #[tokio::test]
    async fn test_flaky_client_recovers() {
        let client = FlakyLlmClient::transient(1, "ok");
        assert!(client.complete(&[]).await.unwrap_err().is_retryable());
        assert_eq!(client.complete(&[]).await.unwrap(), "ok");
        assert_eq!(client.call_count(), 2);
    }
}
