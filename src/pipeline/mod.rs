//! The question → SQL → result → answer pipeline.
//!
//! # Architecture
//!
//! A [`Pipeline`] is built once per process from a shared connection and the
//! schema description read at startup, then answers any number of questions
//! concurrently. Each call threads a [`PipelineState`] through three stages:
//!
//! - [`SqlGenerator`] asks the model for one statement
//! - [`QueryExecutor`] runs it (refusing anything that is not read-only)
//! - [`AnswerSynthesizer`] asks the model to answer from the result
//!
//! Execution failures are folded into the result text, so only connection
//! and generation failures reach the caller.

mod executor;
mod generator;
mod introspector;
mod synthesizer;

pub use executor::{ExecutionResult, QueryExecutor};
pub use generator::{GeneratedQuery, SqlGenerator};
pub use introspector::{describe, SchemaDescription, SchemaIntrospector};
pub use synthesizer::AnswerSynthesizer;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::config::{Config, PipelineConfig};
use crate::db::DatabaseClient;
use crate::error::{MedshopError, Result};
use crate::llm::LlmClient;

/// Position of one invocation in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    QueryGenerated,
    Executed,
    Answered,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::QueryGenerated => "query_generated",
            Self::Executed => "executed",
            Self::Answered => "answered",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Values produced so far by one invocation.
///
/// A finished invocation ends in [`Stage::Answered`] or [`Stage::Failed`]; in
/// the latter case `error` holds the failure and `failed_after` the last stage
/// that completed.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub question: String,
    pub query: Option<GeneratedQuery>,
    pub result: Option<ExecutionResult>,
    pub answer: Option<String>,
    pub stage: Stage,
    pub failed_after: Option<Stage>,
    pub error: Option<MedshopError>,
}

impl PipelineState {
    fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            query: None,
            result: None,
            answer: None,
            stage: Stage::Start,
            failed_after: None,
            error: None,
        }
    }

    fn fail(&mut self, error: MedshopError) {
        self.failed_after = Some(self.stage);
        self.stage = Stage::Failed;
        self.error = Some(error);
    }
}

/// Answers questions about the connected database.
pub struct Pipeline {
    schema: SchemaDescription,
    generator: SqlGenerator,
    executor: QueryExecutor,
    synthesizer: AnswerSynthesizer,
}

impl Pipeline {
    /// Assembles a pipeline from an open connection and its schema description.
    pub fn new(
        schema: SchemaDescription,
        client: Arc<dyn DatabaseClient>,
        llm: Arc<dyn LlmClient>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            schema,
            generator: SqlGenerator::new(Arc::clone(&llm), client.backend(), config.row_limit),
            executor: QueryExecutor::new(client, config),
            synthesizer: AnswerSynthesizer::new(llm),
        }
    }

    /// Connects to the configured database and reads its schema.
    ///
    /// Fails with a connection error before any model call is made.
    pub async fn connect(config: &Config, llm: Arc<dyn LlmClient>) -> Result<Self> {
        let connection = config.connection()?;
        let introspector =
            SchemaIntrospector::connect(&connection, config.pipeline.sample_rows).await?;
        Self::from_introspector(&introspector, llm, &config.pipeline).await
    }

    /// Reads the schema through `introspector` and shares its connection.
    pub async fn from_introspector(
        introspector: &SchemaIntrospector,
        llm: Arc<dyn LlmClient>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let schema = introspector.describe().await?;
        Ok(Self::new(schema, introspector.client(), llm, config))
    }

    /// The schema description used to ground generation.
    pub fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    /// Answers `question`.
    pub async fn answer(&self, question: &str) -> Result<String> {
        let state = self.run(question).await?;
        state
            .answer
            .ok_or_else(|| MedshopError::internal("Pipeline finished without an answer"))
    }

    /// Runs every stage and returns the final state, or the error that
    /// stopped it.
    pub async fn run(&self, question: &str) -> Result<PipelineState> {
        let mut state = self.trace(question).await;
        match state.error.take() {
            Some(e) => Err(e),
            None => Ok(state),
        }
    }

    /// Runs every stage and returns the terminal state, successful or not.
    ///
    /// Blank questions fail before any stage runs.
    pub async fn trace(&self, question: &str) -> PipelineState {
        let question = question.trim();
        let mut state = PipelineState::new(question);
        if question.is_empty() {
            state.fail(MedshopError::invalid_input("Question must not be empty"));
            return state;
        }

        let start = Instant::now();
        match self.advance(&mut state).await {
            Ok(()) => {
                info!(
                    total_duration_ms = start.elapsed().as_millis() as u64,
                    execution_fault = state.result.as_ref().is_some_and(ExecutionResult::is_fault),
                    "Question answered"
                );
            }
            Err(e) => {
                state.fail(e);
                if let (Some(last), Some(e)) = (state.failed_after, state.error.as_ref()) {
                    error!(
                        stage = %state.stage,
                        last_stage = %last,
                        category = e.category(),
                        "Pipeline failed: {}",
                        e
                    );
                }
            }
        }

        state
    }

    async fn advance(&self, state: &mut PipelineState) -> Result<()> {
        let query = self.generator.generate(&state.question, &self.schema).await?;
        state.query = Some(query.clone());
        state.stage = Stage::QueryGenerated;

        let result = self.executor.execute(&query).await;
        state.result = Some(result.clone());
        state.stage = Stage::Executed;

        let answer = self
            .synthesizer
            .synthesize(&state.question, &query, &result)
            .await?;
        state.answer = Some(answer);
        state.stage = Stage::Answered;

        Ok(())
    }
}
