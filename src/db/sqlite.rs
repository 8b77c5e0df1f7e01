//! SQLite database client implementation.
//!
//! Provides the `SqliteClient` struct that implements the `DatabaseClient` trait
//! for SQLite files and in-memory databases using sqlx.

use crate::config::ConnectionConfig;
use crate::db::{
    Column, ColumnInfo, DatabaseBackend, DatabaseClient, ForeignKey, Index, QueryResult, Row,
    Schema, Table, Value, MAX_ROWS, QUERY_TIMEOUT_SECS,
};
use crate::error::{MedshopError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Opens the database file (or an in-memory database).
    ///
    /// Missing files are not created; a typo in the path must not silently
    /// produce an empty inventory.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let location = config.database.as_deref().unwrap_or("unknown");

        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| MedshopError::connection(format!("Invalid SQLite location: {e}")))?;

        // Every connection to :memory: is a separate database, so the pool must
        // hold exactly one connection for the lifetime of the client.
        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                MedshopError::connection(format!("Cannot open SQLite database '{location}': {e}"))
            })?;

        debug!("Connected to {}", config.display_string());
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let mut tables = self.fetch_tables().await?;
        let mut foreign_keys = Vec::new();
        for table in &tables {
            foreign_keys.extend(self.fetch_foreign_keys(&table.name).await?);
        }

        // A foreign key without target columns points at the target's primary key.
        for fk in &mut foreign_keys {
            if fk.to_columns.iter().any(String::is_empty) {
                if let Some(target) = tables.iter().find(|t| t.name == fk.to_table) {
                    fk.to_columns = target.primary_key.clone();
                }
            }
        }

        for table in &mut tables {
            table.indexes = self.fetch_indexes(&table.name).await?;
        }

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

impl SqliteClient {
    /// Fetches all user tables.
    async fn fetch_tables(&self) -> Result<Vec<Table>> {
        let table_names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MedshopError::query(format!("Failed to fetch tables: {e}")))?;

        let mut tables = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            let (columns, primary_key) = self.fetch_columns(&table_name).await?;
            tables.push(Table {
                name: table_name,
                columns,
                primary_key,
                indexes: Vec::new(),
                sample: None,
            });
        }

        Ok(tables)
    }

    /// Fetches columns and primary key columns for a specific table.
    async fn fetch_columns(&self, table_name: &str) -> Result<(Vec<Column>, Vec<String>)> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?1)
            ORDER BY cid
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            MedshopError::query(format!("Failed to fetch columns for {table_name}: {e}"))
        })?;

        let mut pk_columns: Vec<(i64, String)> = rows
            .iter()
            .filter(|(_, _, _, _, pk)| *pk > 0)
            .map(|(name, _, _, _, pk)| (*pk, name.clone()))
            .collect();
        pk_columns.sort();

        let columns = rows
            .into_iter()
            .map(|(name, data_type, not_null, default, pk)| Column {
                name,
                data_type: data_type.to_lowercase(),
                // SQLite lets INTEGER PRIMARY KEY hold NULL on insert but never stores it.
                is_nullable: not_null == 0 && pk == 0,
                default,
            })
            .collect();

        Ok((columns, pk_columns.into_iter().map(|(_, name)| name).collect()))
    }

    /// Fetches non-primary-key indexes for a specific table.
    async fn fetch_indexes(&self, table_name: &str) -> Result<Vec<Index>> {
        let index_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT name, "unique"
            FROM pragma_index_list(?1)
            WHERE origin != 'pk'
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            MedshopError::query(format!("Failed to fetch indexes for {table_name}: {e}"))
        })?;

        let mut indexes = Vec::with_capacity(index_rows.len());
        for (name, unique) in index_rows {
            let columns: Vec<Option<String>> = sqlx::query_scalar(
                "SELECT name FROM pragma_index_info(?1) ORDER BY seqno",
            )
            .bind(&name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MedshopError::query(format!("Failed to fetch index {name}: {e}")))?;

            indexes.push(Index {
                name,
                columns: columns.into_iter().flatten().collect(),
                is_unique: unique != 0,
            });
        }

        Ok(indexes)
    }

    /// Fetches the foreign keys declared on a specific table.
    async fn fetch_foreign_keys(&self, table_name: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, "table", "from", "to"
            FROM pragma_foreign_key_list(?1)
            ORDER BY id, seq
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            MedshopError::query(format!("Failed to fetch foreign keys for {table_name}: {e}"))
        })?;

        let mut foreign_keys: Vec<(i64, ForeignKey)> = Vec::new();
        for (id, to_table, from_column, to_column) in rows {
            let position = foreign_keys.iter().position(|(fk_id, _)| *fk_id == id);
            let fk = match position {
                Some(pos) => &mut foreign_keys[pos].1,
                None => {
                    foreign_keys.push((
                        id,
                        ForeignKey::new(table_name, Vec::new(), to_table, Vec::new()),
                    ));
                    let last = foreign_keys.len() - 1;
                    &mut foreign_keys[last].1
                }
            };
            fk.from_columns.push(from_column);
            fk.to_columns.push(to_column.unwrap_or_default());
        }

        Ok(foreign_keys.into_iter().map(|(_, fk)| fk).collect())
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts a single value using its runtime storage class.
///
/// SQLite columns are loosely typed, so the declared column type is only a hint.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "INT8" => row
            .try_get::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "BOOLEAN" | "BOOL" => row
            .try_get::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row
            .try_get::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .or_else(|_| row.try_get::<i64, _>(index).map(Value::Int))
            .or_else(|_| row.try_get::<f64, _>(index).map(Value::Float))
            .unwrap_or(Value::Null),
    }
}

/// Formats a query error, keeping only the engine message for database errors.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => format!("ERROR: {}", db_error.message()),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    async fn memory_client() -> SqliteClient {
        let config = ConnectionConfig::from_connection_string("sqlite::memory:").unwrap();
        SqliteClient::connect(&config).await.unwrap()
    }

    async fn seeded_client() -> SqliteClient {
        let client = memory_client().await;
        for sql in [
            "CREATE TABLE stores (id INTEGER PRIMARY KEY, city TEXT NOT NULL)",
            "CREATE TABLE medicines (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                store_id INTEGER NOT NULL REFERENCES stores(id),
                quantity INTEGER DEFAULT 0,
                price REAL
            )",
            "CREATE INDEX idx_medicines_store ON medicines(store_id)",
            "INSERT INTO stores (id, city) VALUES (3, 'Leeds')",
            "INSERT INTO medicines (name, store_id, quantity, price) VALUES ('Ibuprofen', 3, 120, 4.5)",
        ] {
            assert_ok!(client.execute_query(sql).await);
        }
        client
    }

    #[tokio::test]
    async fn test_in_memory_database_persists_across_queries() {
        let client = seeded_client().await;
        let result = client
            .execute_query("SELECT COUNT(*) AS n FROM medicines")
            .await
            .unwrap();
        assert_eq!(result.rows[0][0], Value::Int(1));
    }

    #[tokio::test]
    async fn test_introspect_schema() {
        let client = seeded_client().await;
        let schema = client.introspect_schema().await.unwrap();

        let names: Vec<_> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["medicines", "stores"]);

        let medicines = schema.table("medicines").unwrap();
        assert_eq!(medicines.primary_key, vec!["id"]);
        assert_eq!(medicines.columns.len(), 5);
        assert_eq!(medicines.columns[1].name, "name");
        assert_eq!(medicines.columns[1].data_type, "text");
        assert!(!medicines.columns[1].is_nullable);
        assert_eq!(medicines.columns[3].default.as_deref(), Some("0"));
        assert_eq!(medicines.indexes.len(), 1);
        assert_eq!(medicines.indexes[0].columns, vec!["store_id"]);

        assert_eq!(schema.foreign_keys.len(), 1);
        assert_eq!(schema.foreign_keys[0].from_table, "medicines");
        assert_eq!(schema.foreign_keys[0].to_table, "stores");
        assert_eq!(schema.foreign_keys[0].to_columns, vec!["id"]);
    }

    #[tokio::test]
    async fn test_execute_converts_values() {
        let client = seeded_client().await;
        let result = client
            .execute_query("SELECT name, quantity, price, NULL AS note FROM medicines")
            .await
            .unwrap();

        assert_eq!(result.columns[0].name, "name");
        assert_eq!(
            result.rows[0],
            vec![
                Value::from("Ibuprofen"),
                Value::Int(120),
                Value::Float(4.5),
                Value::Null
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_error_is_query_error() {
        let client = seeded_client().await;
        let err = client
            .execute_query("SELECT * FROM patients")
            .await
            .unwrap_err();
        assert!(matches!(err, MedshopError::Query(_)));
        assert!(err.to_string().contains("no such table: patients"));
    }

    #[tokio::test]
    async fn test_sample_rows() {
        let client = seeded_client().await;
        let sample = client.sample_rows("medicines", 3).await.unwrap();
        assert_eq!(sample.row_count, 1);
        assert_eq!(sample.columns.len(), 5);
    }

    #[tokio::test]
    async fn test_missing_file_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("missing.db").display());
        let config = ConnectionConfig::from_connection_string(&url).unwrap();

        let err = SqliteClient::connect(&config).await.unwrap_err();
        assert!(matches!(err, MedshopError::Connection(_)));
        assert!(err.to_string().contains("missing.db"));
    }
}
