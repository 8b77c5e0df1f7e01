//! HTTP API tests over a real socket.

use std::sync::Arc;

use medshop_nlq::chat::ChatClient;
use medshop_nlq::config::Config;
use medshop_nlq::llm::MockLlmClient;
use medshop_nlq::server::{router, AppState, PipelineProvider};

use super::common::seeded_pipeline;

/// Serves a pipeline over the seeded database on an ephemeral port.
pub async fn spawn_server() -> String {
    let (pipeline, _) = seeded_pipeline(Arc::new(MockLlmClient::new())).await;
    let config = Config {
        app_env: "test".to_string(),
        database_url: Some("sqlite::memory:".to_string()),
        ..Config::default()
    };
    let state = AppState::new(&config, PipelineProvider::ready(pipeline));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    format!("http://{address}")
}

#[tokio::test]
async fn test_health_over_http() {
    let client = ChatClient::new(spawn_server().await).unwrap();

    let health = client.health().await.unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.environment, "test");
    assert!(health.database_connected);
}

#[tokio::test]
async fn test_query_over_http() {
    let client = ChatClient::new(spawn_server().await).unwrap();

    let answer = client
        .ask("List all medicines in stock at store 3")
        .await
        .unwrap();

    assert_eq!(answer, "The results are: Amoxicillin, Ibuprofen.");
}

#[tokio::test]
async fn test_empty_question_over_http() {
    let client = ChatClient::new(spawn_server().await).unwrap();

    let err = client.ask("").await.unwrap_err();

    assert_eq!(err.to_string(), "Question must not be empty (422)");
}

#[tokio::test]
async fn test_missing_database_over_http() {
    let config = Arc::new(Config::default());
    let state = AppState::new(
        &config,
        PipelineProvider::new(Arc::clone(&config), Arc::new(MockLlmClient::new())),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    let client = ChatClient::new(format!("http://{address}")).unwrap();

    assert!(!client.health().await.unwrap().database_connected);
    let err = client.ask("medicines at store 3").await.unwrap_err();
    assert_eq!(err.to_string(), "Database connection error (503)");
}
