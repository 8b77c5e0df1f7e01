//! Scripted chat sessions against a live server.

use medshop_nlq::chat::{run_repl, ChatClient, PROMPT, WELCOME};

use super::server_test::spawn_server;

async fn session(script: &str) -> String {
    let client = ChatClient::new(spawn_server().await).unwrap();
    let mut out = Vec::new();
    run_repl(&client, script.as_bytes(), &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_session_shows_status_then_answers() {
    let transcript = session("Which medicines are at store 1?\n/quit\n").await;

    assert!(transcript.starts_with(WELCOME));
    assert!(transcript.contains("API Status: Healthy"));
    assert!(transcript.contains("Environment: test"));
    assert!(transcript.contains("Database: Connected"));
    assert!(transcript.contains(PROMPT));
    assert!(transcript.contains("The results are: Paracetamol."));
}

#[tokio::test]
async fn test_blank_lines_are_skipped_and_eof_ends_session() {
    let transcript = session("\n   \nList all medicines in stock at store 3\n").await;

    assert!(transcript.contains("The results are: Amoxicillin, Ibuprofen."));
    assert!(!transcript.contains("API Error"));
}

#[tokio::test]
async fn test_unanswerable_question_reports_api_error() {
    let transcript = session("What is the weather like?\n").await;

    assert!(transcript.contains("API Error: Failed to process query (500)"));
}
