//! Database abstraction layer for MedShop.
//!
//! Provides a trait-based interface for database operations, allowing
//! different database backends to be used interchangeably.

mod mock;
mod postgres;
mod schema;
mod sqlite;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient};
pub use postgres::PostgresClient;
pub use schema::{Column, ForeignKey, Index, Schema, Table};
pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Maximum number of connection retry attempts.
pub(crate) const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Base delay between connection attempts (doubles each retry).
pub(crate) const CONNECT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Statement timeout applied by every backend.
pub(crate) const QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum rows to fetch from a query.
pub(crate) const MAX_ROWS: usize = 1000;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Sqlite => 0,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the SQL dialect name used in generation prompts.
    pub fn dialect_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }
}

/// Creates a database client for the given backend and configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Sqlite => {
            let client = SqliteClient::connect(config).await?;
            Ok(Box::new(client))
        }
    }
}

/// Quotes an identifier for use in generated SQL. Both backends accept double quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with MedshopError.
/// Implementations must tolerate concurrent use from many requests.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Returns the backend this client talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Introspects the database schema, returning table and relationship information.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Executes a SQL query and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Fetches up to `limit` example rows from a table.
    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryResult> {
        let sql = format!("SELECT * FROM {} LIMIT {}", quote_identifier(table), limit);
        self.execute_query(&sql).await
    }

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
