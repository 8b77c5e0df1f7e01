//! Schema introspection.
//!
//! Turns table, column and relationship metadata plus a few example rows per
//! table into the text that grounds SQL generation.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::db::{self, DatabaseClient};
use crate::error::{MedshopError, Result};

/// Immutable schema text shared by every pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescription(Arc<str>);

impl SchemaDescription {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads schema metadata from a live connection.
pub struct SchemaIntrospector {
    client: Arc<dyn DatabaseClient>,
    sample_rows: usize,
}

impl SchemaIntrospector {
    /// Opens a connection pool for `config`.
    pub async fn connect(config: &ConnectionConfig, sample_rows: usize) -> Result<Self> {
        let client = db::connect(config).await?;
        Ok(Self::from_client(Arc::from(client), sample_rows))
    }

    /// Wraps an existing client.
    pub fn from_client(client: Arc<dyn DatabaseClient>, sample_rows: usize) -> Self {
        Self {
            client,
            sample_rows,
        }
    }

    /// The connection this introspector reads from.
    pub fn client(&self) -> Arc<dyn DatabaseClient> {
        Arc::clone(&self.client)
    }

    /// Builds the schema description.
    ///
    /// Output is deterministic for a fixed database state. Any failure to read
    /// metadata is reported as a connection error; a table whose sample rows
    /// cannot be read is described without them.
    pub async fn describe(&self) -> Result<SchemaDescription> {
        let start = Instant::now();

        let mut schema = self.client.introspect_schema().await.map_err(|e| match e {
            MedshopError::Connection(_) => e,
            other => MedshopError::connection(format!(
                "Schema introspection failed: {}",
                other.detail()
            )),
        })?;
        schema.normalize();

        if self.sample_rows > 0 {
            for table in &mut schema.tables {
                match self.client.sample_rows(&table.name, self.sample_rows).await {
                    Ok(sample) => table.sample = Some(sample),
                    Err(e) => warn!(table = %table.name, "Could not read sample rows: {}", e),
                }
            }
        }

        let description = SchemaDescription::new(schema.format_for_llm());

        debug!(schema_len = description.as_str().len(), "Schema description built");
        info!(
            tables = schema.tables.len(),
            foreign_keys = schema.foreign_keys.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Schema introspected"
        );

        Ok(description)
    }

    /// Builds the schema description, then closes the connection.
    ///
    /// A failure to close is logged; it never replaces the describe outcome.
    pub async fn describe_and_close(self) -> Result<SchemaDescription> {
        let description = self.describe().await;
        if let Err(e) = self.client.close().await {
            warn!("Failed to close connection after introspection: {}", e);
        }
        description
    }
}

/// Connects, describes the schema, and closes the connection.
pub async fn describe(config: &ConnectionConfig, sample_rows: usize) -> Result<SchemaDescription> {
    SchemaIntrospector::connect(config, sample_rows)
        .await?
        .describe_and_close()
        .await
}
