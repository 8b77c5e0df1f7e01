//! SQL generation from natural-language questions.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::SchemaDescription;
use crate::db::DatabaseBackend;
use crate::error::{MedshopError, Result};
use crate::llm::{build_generation_messages, extract_sql, LlmClient};

/// A single SQL statement extracted from a model reply.
///
/// Only constructed from a non-empty statement. The text is untrusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuery(String);

impl GeneratedQuery {
    /// Accepts `sql` if it has any content.
    pub fn new(sql: impl Into<String>) -> Option<Self> {
        let sql = sql.into();
        let trimmed = sql.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeneratedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asks the language model for one statement answering a question.
pub struct SqlGenerator {
    llm: Arc<dyn LlmClient>,
    dialect: &'static str,
    row_limit: usize,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, backend: DatabaseBackend, row_limit: usize) -> Self {
        Self {
            llm,
            dialect: backend.dialect_name(),
            row_limit,
        }
    }

    /// Generates SQL for `question` grounded in `schema`.
    ///
    /// Fails with a generation error when the model call fails or its reply
    /// holds no statement. The SQL is not checked for validity here.
    pub async fn generate(
        &self,
        question: &str,
        schema: &SchemaDescription,
    ) -> Result<GeneratedQuery> {
        let start = Instant::now();
        let messages =
            build_generation_messages(self.dialect, schema.as_str(), self.row_limit, question);

        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(generation_failure)?;

        debug!(
            reply_len = reply.len(),
            llm_duration_ms = start.elapsed().as_millis() as u64,
            "Received generation reply"
        );

        if reply.trim().is_empty() {
            return Err(MedshopError::generation("Model returned an empty reply"));
        }

        let query = extract_sql(&reply)
            .and_then(GeneratedQuery::new)
            .ok_or_else(|| MedshopError::generation("Model reply contained no SQL statement"))?;

        info!(sql_len = query.as_str().len(), "Generated SQL");
        debug!(sql = %query, "Generated SQL text");

        Ok(query)
    }
}

/// Reports any model failure as a generation error.
pub(crate) fn generation_failure(error: MedshopError) -> MedshopError {
    match error {
        MedshopError::Generation(_) => error,
        other => MedshopError::generation(other.detail()),
    }
}
