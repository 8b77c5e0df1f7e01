//! End-to-end pipeline tests over a seeded SQLite database.

use std::sync::Arc;

use medshop_nlq::config::PipelineConfig;
use medshop_nlq::db::{FailingDatabaseClient, Value};
use medshop_nlq::error::MedshopError;
use medshop_nlq::llm::MockLlmClient;
use medshop_nlq::pipeline::{Pipeline, SchemaIntrospector, Stage};
use tokio::task::JoinSet;

use super::common::seeded_pipeline;

#[tokio::test]
async fn test_store_inventory_question() {
    let llm = MockLlmClient::new();
    let (pipeline, _) = seeded_pipeline(Arc::new(llm.clone())).await;

    let state = pipeline
        .run("List all medicines in stock at store 3")
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Answered);
    assert!(state.query.unwrap().as_str().contains("store_id = 3"));
    assert_eq!(
        state.answer.unwrap(),
        "The results are: Amoxicillin, Ibuprofen."
    );
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_schema_grounds_generation() {
    let llm = MockLlmClient::new();
    let (pipeline, _) = seeded_pipeline(Arc::new(llm.clone())).await;

    assert!(pipeline.schema().as_str().contains("medicines"));
    assert!(pipeline.schema().as_str().contains("stores"));

    pipeline.answer("How many medicines are there?").await.unwrap();

    let requests = llm.requests();
    let system = &requests[0][0].content;
    assert!(system.contains("SQLite"));
    assert!(system.contains("store_id"));
    assert!(system.contains("Paracetamol"));
}

#[tokio::test]
async fn test_same_question_same_answer() {
    let (pipeline, _) = seeded_pipeline(Arc::new(MockLlmClient::new())).await;

    let first = pipeline.answer("Which medicines are at store 1?").await.unwrap();
    let second = pipeline.answer("Which medicines are at store 1?").await.unwrap();

    assert_eq!(first, "The results are: Paracetamol.");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_database_error_is_answered_not_raised() {
    let llm = MockLlmClient::new()
        .with_response("dosage", "```sql\nSELECT dosage FROM medicines LIMIT 10;\n```");
    let (pipeline, _) = seeded_pipeline(Arc::new(llm)).await;

    let state = pipeline.run("What is the dosage of each medicine?").await.unwrap();

    assert!(state.result.unwrap().is_fault());
    assert!(state.answer.unwrap().contains("no such column: dosage"));
}

#[tokio::test]
async fn test_destructive_statement_is_refused() {
    let (pipeline, client) = seeded_pipeline(Arc::new(MockLlmClient::new())).await;

    let answer = pipeline
        .answer("Delete every medicine that is out of stock")
        .await
        .unwrap();

    assert!(answer.contains("only read-only queries are allowed"));
    let count = client
        .execute_query("SELECT COUNT(*) FROM medicines")
        .await
        .unwrap();
    assert_eq!(count.rows[0][0], Value::Int(4));
}

#[tokio::test]
async fn test_unreachable_database_fails_before_any_model_call() {
    let llm = MockLlmClient::new();
    let introspector = SchemaIntrospector::from_client(Arc::new(FailingDatabaseClient), 3);

    let result = Pipeline::from_introspector(
        &introspector,
        Arc::new(llm.clone()),
        &PipelineConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(MedshopError::Connection(_))));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_concurrent_questions_share_one_pipeline() {
    let (pipeline, _) = seeded_pipeline(Arc::new(MockLlmClient::new())).await;
    let pipeline = Arc::new(pipeline);
    let expected = [
        (1, "The results are: Paracetamol."),
        (2, "No matching records were found."),
        (3, "The results are: Amoxicillin, Ibuprofen."),
    ];

    let mut tasks = JoinSet::new();
    for round in 0..8 {
        let (store, answer) = expected[round % expected.len()];
        let pipeline = Arc::clone(&pipeline);
        tasks.spawn(async move {
            let question = format!("Which medicines are in stock at store {store}?");
            (pipeline.answer(&question).await.unwrap(), answer)
        });
    }

    let mut finished = 0;
    while let Some(joined) = tasks.join_next().await {
        let (actual, expected) = joined.unwrap();
        assert_eq!(actual, expected);
        finished += 1;
    }
    assert_eq!(finished, 8);
}
