//! Mock database clients for testing.
//!
//! Provides in-memory database implementations for headless testing of the
//! pipeline and the HTTP surface.

use super::{ColumnInfo, DatabaseBackend, DatabaseClient, QueryResult, Schema, Value};
use crate::error::{MedshopError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// A mock database client that returns predefined results.
///
/// Results and errors are matched by case-insensitive substring against the
/// executed SQL, first registration wins. Every executed statement is recorded.
pub struct MockDatabaseClient {
    schema: Schema,
    results: Vec<(String, QueryResult)>,
    errors: Vec<(String, String)>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with an empty schema.
    pub fn new() -> Self {
        Self {
            schema: Schema::default(),
            results: Vec::new(),
            errors: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Creates a new mock database client with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::new()
        }
    }

    /// Returns `result` for any statement containing `pattern`.
    pub fn with_result(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.results.push((pattern.into().to_lowercase(), result));
        self
    }

    /// Fails any statement containing `pattern` with a query error.
    pub fn with_error(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors
            .push((pattern.into().to_lowercase(), message.into()));
        self
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|sqls| sqls.clone())
            .unwrap_or_default()
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        let sql_lower = sql.to_lowercase();

        if let Some((_, message)) = self
            .errors
            .iter()
            .find(|(pattern, _)| sql_lower.contains(pattern.as_str()))
        {
            return Err(MedshopError::query(message.clone()));
        }

        if let Some((_, result)) = self
            .results
            .iter()
            .find(|(pattern, _)| sql_lower.contains(pattern.as_str()))
        {
            return Ok(result.clone());
        }

        if sql_lower.trim_start().starts_with("select") {
            let columns = vec![ColumnInfo::new("result", "text")];
            let rows = vec![vec![Value::String(format!("Mock result for: {}", sql))]];
            Ok(QueryResult::with_data(columns, rows).with_execution_time(Duration::from_millis(1)))
        } else {
            Ok(QueryResult::new().with_execution_time(Duration::from_millis(1)))
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A database client whose data source is unreachable.
///
/// Introspection fails with a connection error; execution fails with a query error.
#[derive(Debug, Default)]
pub struct FailingDatabaseClient;

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Err(MedshopError::connection(
            "Connection refused. Is the database server running?",
        ))
    }

    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        Err(MedshopError::query("server closed the connection unexpectedly"))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Table;

    #[tokio::test]
    async fn test_mock_introspect_schema() {
        let schema = Schema {
            tables: vec![Table::new("medicines")],
            foreign_keys: vec![],
        };
        let client = MockDatabaseClient::with_schema(schema);

        let result = client.introspect_schema().await.unwrap();
        assert_eq!(result.tables.len(), 1);
        assert_eq!(result.tables[0].name, "medicines");
    }

    #[tokio::test]
    async fn test_mock_registered_result() {
        let expected = QueryResult::with_data(
            vec![ColumnInfo::new("count", "integer")],
            vec![vec![Value::Int(12)]],
        );
        let client = MockDatabaseClient::new().with_result("FROM medicines", expected.clone());

        let result = client
            .execute_query("select count(*) from medicines")
            .await
            .unwrap();
        assert_eq!(result, expected);
    }

    #[tokio::test]
    async fn test_mock_registered_error() {
        let client = MockDatabaseClient::new().with_error("patients", "no such table: patients");

        let err = client
            .execute_query("SELECT * FROM patients")
            .await
            .unwrap_err();
        assert!(matches!(err, MedshopError::Query(_)));
        assert_eq!(client.executed(), vec!["SELECT * FROM patients".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_default_select() {
        let client = MockDatabaseClient::new();

        let result = client.execute_query("SELECT 1").await.unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.columns[0].name, "result");
    }

    #[tokio::test]
    async fn test_failing_client() {
        let client = FailingDatabaseClient;
        assert!(matches!(
            client.introspect_schema().await,
            Err(MedshopError::Connection(_))
        ));
        assert!(matches!(
            client.execute_query("SELECT 1").await,
            Err(MedshopError::Query(_))
        ));
    }
}
