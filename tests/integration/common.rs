//! Shared fixtures: a small seeded inventory database.

use std::sync::Arc;

use medshop_nlq::config::{ConnectionConfig, PipelineConfig};
use medshop_nlq::db::{DatabaseClient, SqliteClient};
use medshop_nlq::llm::LlmClient;
use medshop_nlq::pipeline::{Pipeline, SchemaIntrospector};

const SEED: &[&str] = &[
    "CREATE TABLE stores (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE medicines (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL DEFAULT 0,
        price REAL,
        store_id INTEGER NOT NULL REFERENCES stores(id)
    )",
    "INSERT INTO stores (id, name) VALUES (1, 'Downtown'), (3, 'Riverside')",
    "INSERT INTO medicines (name, quantity, price, store_id) VALUES
        ('Paracetamol', 200, 2.5, 1),
        ('Ibuprofen', 120, 3.75, 3),
        ('Amoxicillin', 40, 8.0, 3),
        ('Insulin', 0, 25.0, 3)",
];

/// Opens an in-memory inventory database with two stores and four medicines.
pub async fn seeded_client() -> Arc<dyn DatabaseClient> {
    let config = ConnectionConfig::from_connection_string("sqlite::memory:").unwrap();
    let client = SqliteClient::connect(&config).await.unwrap();
    for statement in SEED {
        client.execute_query(statement).await.unwrap();
    }
    Arc::new(client)
}

/// Builds a pipeline over the seeded database.
pub async fn seeded_pipeline(llm: Arc<dyn LlmClient>) -> (Pipeline, Arc<dyn DatabaseClient>) {
    let client = seeded_client().await;
    let introspector = SchemaIntrospector::from_client(Arc::clone(&client), 3);
    let pipeline = Pipeline::from_introspector(&introspector, llm, &PipelineConfig::default())
        .await
        .unwrap();
    (pipeline, client)
}
