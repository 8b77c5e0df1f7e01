//! HTTP surface: `POST /query` and `GET /health`.
//!
//! One pipeline serves every request. It is built on first use and cached; a
//! failed build is not cached, so the next request tries again.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{MedshopError, Result};
use crate::llm::{create_client, LlmClient};
use crate::pipeline::Pipeline;

const MALFORMED_BODY: &str = r#"Request body must be a JSON object with a "question" string"#;

/// Body of `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// Successful reply to `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub result: String,
}

/// Reply to `GET /health`.
///
/// `database_connected` reports whether a database URL is configured, not
/// whether the database is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub environment: String,
    pub database_connected: bool,
}

impl HealthStatus {
    pub fn from_config(config: &Config) -> Self {
        Self {
            status: "healthy".to_string(),
            environment: config.app_env.clone(),
            database_connected: config.has_database_url(),
        }
    }
}

/// Error body shared by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

enum PipelineSource {
    Configured {
        config: Arc<Config>,
        llm: Arc<dyn LlmClient>,
    },
    Prebuilt,
}

/// Builds the process-wide pipeline on demand.
pub struct PipelineProvider {
    cell: OnceCell<Arc<Pipeline>>,
    source: PipelineSource,
}

impl PipelineProvider {
    /// Connects using `config` on first use.
    pub fn new(config: Arc<Config>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            cell: OnceCell::new(),
            source: PipelineSource::Configured { config, llm },
        }
    }

    /// Serves an already-built pipeline.
    pub fn ready(pipeline: Pipeline) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(pipeline))),
            source: PipelineSource::Prebuilt,
        }
    }

    /// Returns the pipeline, connecting first if needed.
    pub async fn get(&self) -> Result<Arc<Pipeline>> {
        self.cell
            .get_or_try_init(|| self.build())
            .await
            .map(Arc::clone)
    }

    async fn build(&self) -> Result<Arc<Pipeline>> {
        match &self.source {
            PipelineSource::Configured { config, llm } => {
                let pipeline = Pipeline::connect(config, Arc::clone(llm)).await?;
                info!("Pipeline ready");
                Ok(Arc::new(pipeline))
            }
            PipelineSource::Prebuilt => Err(MedshopError::internal("Pipeline is not available")),
        }
    }
}

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    health: HealthStatus,
    pipeline: Arc<PipelineProvider>,
}

impl AppState {
    pub fn new(config: &Config, pipeline: PipelineProvider) -> Self {
        Self {
            health: HealthStatus::from_config(config),
            pipeline: Arc::new(pipeline),
        }
    }

    /// The lazily built pipeline.
    pub fn pipeline(&self) -> Arc<PipelineProvider> {
        Arc::clone(&self.pipeline)
    }
}

/// Maps pipeline errors to opaque HTTP errors. Details go to the log only.
pub struct ApiError(MedshopError);

impl From<MedshopError> for ApiError {
    fn from(error: MedshopError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            MedshopError::Connection(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Database connection error".to_string(),
            ),
            MedshopError::InvalidInput(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process query".to_string(),
            ),
        };

        if status.is_server_error() {
            error!(category = self.0.category(), "Request failed: {}", self.0);
        } else {
            warn!("Rejected request: {}", self.0);
        }

        (status, Json(ErrorBody { detail })).into_response()
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn query(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        debug!("Malformed query body: {}", rejection.body_text());
        MedshopError::invalid_input(MALFORMED_BODY)
    })?;

    if request.question.trim().is_empty() {
        return Err(MedshopError::invalid_input("Question must not be empty").into());
    }

    let pipeline = state.pipeline.get().await?;
    let result = pipeline.answer(&request.question).await?;

    Ok(Json(QueryResponse { result }))
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.health.clone())
}

/// Runs the HTTP server until Ctrl-C.
pub async fn serve(config: Config) -> Result<()> {
    let llm = create_client(&config.llm)?;
    let config = Arc::new(config);

    if !config.has_database_url() {
        warn!("DATABASE_URL is not set; /query will report a connection error");
    }

    let state = AppState::new(&config, PipelineProvider::new(Arc::clone(&config), llm));

    // Warm the pipeline in the background so the first request does not pay for it.
    if config.has_database_url() {
        let provider = state.pipeline();
        tokio::spawn(async move {
            if let Err(e) = provider.get().await {
                warn!("Pipeline warm-up failed, will retry on first request: {}", e);
            }
        });
    }

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| MedshopError::config(format!("Cannot listen on {address}: {e}")))?;

    info!(environment = %config.app_env, "Listening on http://{}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MedshopError::internal(format!("Server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::db::{ColumnInfo, MockDatabaseClient, QueryResult, Value};
    use crate::llm::{FlakyLlmClient, MockLlmClient};
    use crate::pipeline::SchemaDescription;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn config(database_url: Option<&str>) -> Config {
        Config {
            app_env: "test".to_string(),
            database_url: database_url.map(str::to_string),
            ..Config::default()
        }
    }

    fn ready_state(llm: Arc<dyn LlmClient>) -> AppState {
        let db = MockDatabaseClient::new().with_result(
            "store_id = 3",
            QueryResult::with_data(
                vec![ColumnInfo::new("name", "text")],
                vec![vec![Value::from("Amoxicillin")], vec![Value::from("Ibuprofen")]],
            ),
        );
        let pipeline = Pipeline::new(
            SchemaDescription::new("Table: medicines\n"),
            Arc::new(db),
            llm,
            &PipelineConfig::default(),
        );
        AppState::new(&config(Some("sqlite::memory:")), PipelineProvider::ready(pipeline))
    }

    fn post_query(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_configured_database() {
        let app = router(ready_state(Arc::new(MockLlmClient::new())));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({
                "status": "healthy",
                "environment": "test",
                "database_connected": true
            })
        );
    }

    #[test]
    fn test_health_without_database_url() {
        assert!(!HealthStatus::from_config(&config(None)).database_connected);
        assert!(!HealthStatus::from_config(&config(Some("  "))).database_connected);
    }

    #[tokio::test]
    async fn test_query_returns_answer() {
        let app = router(ready_state(Arc::new(MockLlmClient::new())));

        let response = app
            .oneshot(post_query(r#"{"question": "List all medicines in stock at store 3"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"result": "The results are: Amoxicillin, Ibuprofen."})
        );
    }

    #[tokio::test]
    async fn test_empty_question_is_unprocessable() {
        let app = router(ready_state(Arc::new(MockLlmClient::new())));

        let response = app.oneshot(post_query(r#"{"question": "   "}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"detail": "Question must not be empty"})
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_unprocessable_json() {
        for body in [r#"{"question": "#, r#"{"q": "medicines"}"#, "not json"] {
            let app = router(ready_state(Arc::new(MockLlmClient::new())));

            let response = app.oneshot(post_query(body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(
                json_body(response).await,
                serde_json::json!({"detail": MALFORMED_BODY})
            );
        }
    }

    #[tokio::test]
    async fn test_missing_database_is_service_unavailable() {
        let cfg = Arc::new(config(None));
        let state = AppState::new(
            &cfg,
            PipelineProvider::new(Arc::clone(&cfg), Arc::new(MockLlmClient::new())),
        );
        let app = router(state);

        let response = app
            .oneshot(post_query(r#"{"question": "medicines at store 3"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"detail": "Database connection error"})
        );
    }

    #[tokio::test]
    async fn test_generation_failure_is_opaque_500() {
        let app = router(ready_state(Arc::new(FlakyLlmClient::permanent(
            "Authentication failed. Check your OPENAI_API_KEY.",
        ))));

        let response = app
            .oneshot(post_query(r#"{"question": "medicines at store 3"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"detail": "Failed to process query"})
        );
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let cfg = Arc::new(config(None));
        let provider = PipelineProvider::new(Arc::clone(&cfg), Arc::new(MockLlmClient::new()));

        assert!(provider.get().await.is_err());
        assert!(provider.get().await.is_err());
        assert!(!provider.cell.initialized());
    }
}
