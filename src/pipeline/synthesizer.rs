//! Answer synthesis from a question, its SQL, and the execution result.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::generator::generation_failure;
use super::{ExecutionResult, GeneratedQuery};
use crate::error::{MedshopError, Result};
use crate::llm::{build_answer_messages, LlmClient};

/// Turns query output into a natural-language answer.
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Produces the final answer. Fault texts are passed to the model like rows.
    pub async fn synthesize(
        &self,
        question: &str,
        query: &GeneratedQuery,
        result: &ExecutionResult,
    ) -> Result<String> {
        let start = Instant::now();
        let messages = build_answer_messages(question, query.as_str(), result.as_text());

        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(generation_failure)?;

        let answer = reply.trim();
        if answer.is_empty() {
            return Err(MedshopError::generation("Model returned an empty answer"));
        }

        info!(
            answer_len = answer.len(),
            from_fault = result.is_fault(),
            llm_duration_ms = start.elapsed().as_millis() as u64,
            "Answer synthesized"
        );

        Ok(answer.to_string())
    }
}
