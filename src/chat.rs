//! Interactive chat front-end for a running MedShop server.
//!
//! Talks to the HTTP API only; it never touches the database or the model
//! directly.

use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::Client;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::server::{ErrorBody, HealthStatus, QueryRequest, QueryResponse};

/// Greeting printed when a session starts.
pub const WELCOME: &str = "Welcome to MedShop! Ask me about medical inventory or drug information.";

/// Input prompt.
pub const PROMPT: &str = "Ask about medical inventory...";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the `/query` and `/health` endpoints.
pub struct ChatClient {
    http: Client,
    endpoint: String,
}

impl ChatClient {
    /// Creates a client for the server at `endpoint` (e.g. `http://localhost:8000`).
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetches the server's readiness report.
    pub async fn health(&self) -> anyhow::Result<HealthStatus> {
        let response = self
            .http
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
            .with_context(|| format!("Cannot reach {}", self.endpoint))?;

        if !response.status().is_success() {
            bail!("Health check returned {}", response.status());
        }

        response
            .json::<HealthStatus>()
            .await
            .context("Malformed health response")
    }

    /// Sends one question and returns the server's answer.
    pub async fn ask(&self, question: &str) -> anyhow::Result<String> {
        debug!(endpoint = %self.endpoint, "Sending question");

        let response = self
            .http
            .post(format!("{}/query", self.endpoint))
            .json(&QueryRequest {
                question: question.to_string(),
            })
            .send()
            .await
            .with_context(|| format!("Cannot reach {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.detail)
                .unwrap_or_else(|_| status.to_string());
            bail!("{detail} ({})", status.as_u16());
        }

        let body: QueryResponse = response.json().await.context("Malformed query response")?;
        Ok(body.result)
    }
}

/// Renders the status panel shown at the top of a session.
pub fn format_status(health: &HealthStatus) -> String {
    let status = if health.status == "healthy" {
        "Healthy".to_string()
    } else {
        health.status.clone()
    };
    let database = if health.database_connected {
        "Connected"
    } else {
        "Disconnected"
    };

    format!(
        "API Status: {status}\nEnvironment: {}\nDatabase: {database}",
        health.environment
    )
}

/// Runs the read-ask-print loop until `/quit` or end of input.
///
/// Transport and server errors are printed and the loop continues.
pub async fn run_repl<R, W>(client: &ChatClient, input: R, out: &mut W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{WELCOME}")?;
    match client.health().await {
        Ok(health) => writeln!(out, "{}", format_status(&health))?,
        Err(e) => writeln!(out, "API Error: {e:#}")?,
    }

    let mut lines = input.lines();
    loop {
        write!(out, "\n{PROMPT}\n> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "/quit" | "/exit") {
            break;
        }

        match client.ask(question).await {
            Ok(answer) => writeln!(out, "{answer}")?,
            Err(e) => writeln!(out, "API Error: {e:#}")?,
        }
    }

    writeln!(out)?;
    Ok(())
}
