//! Query execution.
//!
//! Runs generated SQL and renders the outcome as text for the synthesizer.
//! Failures never escape: they become part of the result.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::GeneratedQuery;
use crate::config::PipelineConfig;
use crate::db::DatabaseClient;
use crate::safety::SqlClassifier;

/// Outcome of running a generated statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The statement ran; `text` is the rendered table.
    Rows { text: String, row_count: usize },
    /// The statement was refused or failed; the text starts with `Error:`.
    Fault(String),
}

impl ExecutionResult {
    fn fault(detail: impl AsRef<str>) -> Self {
        Self::Fault(format!("Error: {}", detail.as_ref()))
    }

    /// Text handed to the answer synthesizer.
    pub fn as_text(&self) -> &str {
        match self {
            Self::Rows { text, .. } => text,
            Self::Fault(text) => text,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// Executes generated statements against the shared connection.
pub struct QueryExecutor {
    client: Arc<dyn DatabaseClient>,
    classifier: SqlClassifier,
    max_result_rows: usize,
    enforce_read_only: bool,
}

impl QueryExecutor {
    pub fn new(client: Arc<dyn DatabaseClient>, config: &PipelineConfig) -> Self {
        let classifier = SqlClassifier::for_backend(client.backend());
        Self {
            client,
            classifier,
            max_result_rows: config.max_result_rows,
            enforce_read_only: config.enforce_read_only,
        }
    }

    /// Runs `query`. Never fails: refusals and database errors become a fault.
    pub async fn execute(&self, query: &GeneratedQuery) -> ExecutionResult {
        if self.enforce_read_only {
            let classification = self.classifier.classify(query.as_str());
            if let Some(reason) = classification.refusal_reason() {
                warn!(
                    level = %classification.level,
                    statement = %classification.statement_type,
                    "Refused generated statement"
                );
                return ExecutionResult::fault(reason);
            }
        }

        let start = Instant::now();
        match self.client.execute_query(query.as_str()).await {
            Ok(result) => {
                info!(
                    rows = result.row_count,
                    truncated = result.was_truncated,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Query executed"
                );
                ExecutionResult::Rows {
                    text: result.to_text_table(self.max_result_rows),
                    row_count: result.row_count,
                }
            }
            Err(e) => {
                debug!(sql = %query, "Failed statement");
                warn!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Query failed: {}",
                    e
                );
                ExecutionResult::fault(e.detail())
            }
        }
    }
}
