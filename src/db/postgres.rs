//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use crate::config::ConnectionConfig;
use crate::db::{
    Column, ColumnInfo, DatabaseBackend, DatabaseClient, ForeignKey, Index, QueryResult, Row,
    Schema, Table, Value, CONNECT_RETRY_BASE_DELAY_MS, MAX_CONNECT_ATTEMPTS, MAX_ROWS,
    QUERY_TIMEOUT_SECS,
};
use crate::error::{MedshopError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Opens a connection pool, retrying transient failures with backoff.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(CONNECT_RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_CONNECT_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to {}", config.display_string());
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if !is_transient {
                        break;
                    }

                    if attempt < MAX_CONNECT_ATTEMPTS {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2; // Exponential backoff
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => MedshopError::connection("No connection attempt was made"),
        })
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let tables = self.fetch_tables().await?;
        let foreign_keys = self.fetch_foreign_keys().await?;

        let mut schema = Schema {
            tables,
            foreign_keys,
        };
        schema.normalize();
        Ok(schema)
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            MedshopError::query(format!(
                "Query timed out after {QUERY_TIMEOUT_SECS} seconds"
            ))
        })?
        .map_err(|e| MedshopError::query(format_query_error(e)))?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let total_rows = result.len();
        let was_truncated = total_rows > MAX_ROWS;

        if was_truncated {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                total_rows, MAX_ROWS
            );
        }

        let rows: Vec<Row> = result.iter().take(MAX_ROWS).map(convert_row).collect();
        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
            row_count,
            total_rows: Some(total_rows),
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// One `information_schema.columns` row: table, column, type, nullable, default.
type ColumnRow = (String, String, String, String, Option<String>);

impl PostgresClient {
    /// Reads every base table of the `public` schema with its columns,
    /// primary key and secondary indexes.
    ///
    /// Each catalog is read in a single query for the whole schema, so the
    /// cost does not grow with the number of tables.
    async fn fetch_tables(&self) -> Result<Vec<Table>> {
        let column_rows: Vec<ColumnRow> = sqlx::query_as(
            r#"
            SELECT c.table_name::text, c.column_name::text, c.data_type::text,
                   c.is_nullable::text, c.column_default::text
            FROM information_schema.columns c
            JOIN information_schema.tables t
                ON t.table_schema = c.table_schema AND t.table_name = c.table_name
            WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE'
            ORDER BY c.table_name, c.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MedshopError::query(format!("Failed to read columns: {e}")))?;

        let mut tables: BTreeMap<String, Table> = BTreeMap::new();
        for (table_name, name, data_type, is_nullable, default) in column_rows {
            tables
                .entry(table_name.clone())
                .or_insert_with(|| Table {
                    name: table_name,
                    ..Table::default()
                })
                .columns
                .push(Column {
                    name,
                    data_type,
                    is_nullable: is_nullable == "YES",
                    default,
                });
        }

        for (table_name, column) in self.fetch_primary_keys().await? {
            if let Some(table) = tables.get_mut(&table_name) {
                table.primary_key.push(column);
            }
        }

        for (table_name, index) in self.fetch_indexes().await? {
            if let Some(table) = tables.get_mut(&table_name) {
                table.indexes.push(index);
            }
        }

        Ok(tables.into_values().collect())
    }

    /// Returns `(table, column)` pairs of every primary key, in key order.
    async fn fetch_primary_keys(&self) -> Result<Vec<(String, String)>> {
        sqlx::query_as(
            r#"
            SELECT tc.table_name::text, kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON kcu.constraint_name = tc.constraint_name
                AND kcu.table_schema = tc.table_schema
            WHERE tc.table_schema = 'public' AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY tc.table_name, kcu.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MedshopError::query(format!("Failed to read primary keys: {e}")))
    }

    /// Returns non-primary indexes keyed by the table they belong to.
    async fn fetch_indexes(&self) -> Result<Vec<(String, Index)>> {
        let rows: Vec<(String, String, String, bool)> = sqlx::query_as(
            r#"
            SELECT t.relname::text, i.relname::text, a.attname::text, ix.indisunique
            FROM pg_index ix
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE n.nspname = 'public' AND NOT ix.indisprimary
            ORDER BY t.relname, i.relname, a.attnum
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MedshopError::query(format!("Failed to read indexes: {e}")))?;

        let mut indexes: BTreeMap<(String, String), Index> = BTreeMap::new();
        for (table_name, index_name, column, is_unique) in rows {
            indexes
                .entry((table_name, index_name.clone()))
                .or_insert_with(|| Index {
                    name: index_name,
                    columns: Vec::new(),
                    is_unique,
                })
                .columns
                .push(column);
        }

        Ok(indexes
            .into_iter()
            .map(|((table_name, _), index)| (table_name, index))
            .collect())
    }

    /// Reads every foreign key constraint, grouping multi-column keys.
    async fn fetch_foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT tc.constraint_name::text, kcu.table_name::text, kcu.column_name::text,
                   ccu.table_name::text, ccu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON kcu.constraint_name = tc.constraint_name
                AND kcu.table_schema = tc.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.table_schema = tc.table_schema
            WHERE tc.table_schema = 'public' AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MedshopError::query(format!("Failed to read foreign keys: {e}")))?;

        let mut keys: BTreeMap<String, ForeignKey> = BTreeMap::new();
        for (constraint, from_table, from_column, to_table, to_column) in rows {
            let key = keys.entry(constraint).or_insert_with(|| ForeignKey {
                from_table,
                to_table,
                ..ForeignKey::default()
            });
            if !key.from_columns.contains(&from_column) {
                key.from_columns.push(from_column);
            }
            if !key.to_columns.contains(&to_column) {
                key.to_columns.push(to_column);
            }
        }

        Ok(keys.into_values().collect())
    }
}

fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|col| convert_value(row, col.ordinal(), col.type_info().name()))
        .collect()
}

/// Decodes a nullable column as `T`, mapping NULL and decode failures to `Value::Null`.
fn decode<'r, T, F>(row: &'r PgRow, index: usize, wrap: F) -> Value
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<Option<T>, _>(index) {
        Ok(Some(v)) => wrap(v),
        _ => Value::Null,
    }
}

/// Decodes by Postgres type name.
///
/// Numeric, temporal, uuid and json values are rendered to their text form.
/// Text-like and enum columns are read as strings; any other type whose
/// binary form cannot be decoded becomes `Value::Null`.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name {
        "BOOL" => decode(row, index, Value::Bool),
        "INT2" => decode(row, index, |v: i16| Value::Int(v.into())),
        "INT4" => decode(row, index, |v: i32| Value::Int(v.into())),
        "INT8" => decode(row, index, Value::Int),
        "FLOAT4" => decode(row, index, |v: f32| Value::Float(v.into())),
        "FLOAT8" => decode(row, index, Value::Float),
        "BYTEA" => decode(row, index, Value::Bytes),
        "NUMERIC" => decode(row, index, |v: Decimal| Value::String(v.to_string())),
        "DATE" => decode(row, index, |v: NaiveDate| Value::String(v.to_string())),
        "TIME" => decode(row, index, |v: NaiveTime| Value::String(v.to_string())),
        "TIMESTAMP" => decode(row, index, |v: NaiveDateTime| Value::String(v.to_string())),
        "TIMESTAMPTZ" => decode(row, index, |v: DateTime<Utc>| Value::String(v.to_rfc3339())),
        "UUID" => decode(row, index, |v: Uuid| Value::String(v.to_string())),
        "JSON" | "JSONB" => decode(row, index, |v: JsonValue| Value::String(v.to_string())),
        _ => decode(row, index, Value::String),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> MedshopError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        MedshopError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        MedshopError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        MedshopError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        MedshopError::connection(
            "Server requires SSL. Add '?sslmode=require' to the connection string.",
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        MedshopError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        MedshopError::connection(error.to_string())
    }
}

/// Formats a query error with detail and hint lines if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }

        if let Some(table) = pg_error.table() {
            result.push_str("\n  TABLE: ");
            result.push_str(table);
        }

        if let Some(column) = pg_error.column() {
            result.push_str("\n  COLUMN: ");
            result.push_str(column);
        }
    }

    result
}
