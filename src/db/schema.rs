//! Database schema types for MedShop.
//!
//! Represents the structure of a database including tables, columns,
//! foreign keys, indexes and a few example rows per table.

use super::QueryResult;

/// Represents the complete schema of a database.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// All tables in the schema.
    pub tables: Vec<Table>,

    /// Foreign key relationships between tables.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Returns the table with the given name, if present.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Puts tables, indexes and foreign keys in a stable order.
    ///
    /// Catalog queries that group through hash maps return these in arbitrary
    /// order; prompts built from the schema must not change between runs.
    pub fn normalize(&mut self) {
        self.tables.sort_by(|a, b| a.name.cmp(&b.name));
        for table in &mut self.tables {
            table.indexes.sort_by(|a, b| a.name.cmp(&b.name));
        }
        self.foreign_keys.sort_by(|a, b| {
            (&a.from_table, &a.from_columns, &a.to_table).cmp(&(
                &b.from_table,
                &b.from_columns,
                &b.to_table,
            ))
        });
    }

    /// Formats the schema for inclusion in an LLM prompt.
    ///
    /// Produces a human-readable representation that helps the LLM
    /// understand the database structure and the shape of the data.
    pub fn format_for_llm(&self) -> String {
        let tables_text = self
            .tables
            .iter()
            .map(|table| self.format_table_for_llm(table))
            .collect::<Vec<_>>()
            .join("");

        let foreign_keys_text = if self.foreign_keys.is_empty() {
            String::new()
        } else {
            let fk_lines = self
                .foreign_keys
                .iter()
                .map(|fk| {
                    format!(
                        "  - {}.{} -> {}.{}\n",
                        fk.from_table,
                        fk.from_columns.join(", "),
                        fk.to_table,
                        fk.to_columns.join(", ")
                    )
                })
                .collect::<Vec<_>>()
                .join("");
            format!("Foreign Keys:\n{}", fk_lines)
        };

        format!("Database Schema:\n\n{}{}", tables_text, foreign_keys_text)
    }

    fn format_table_for_llm(&self, table: &Table) -> String {
        let column_lines = table
            .columns
            .iter()
            .map(|column| self.format_column_for_llm(table, column))
            .collect::<Vec<_>>()
            .join("");

        let sample_text = match &table.sample {
            Some(sample) if !sample.is_empty() => {
                let rows = sample
                    .to_text_table(sample.rows.len())
                    .lines()
                    .map(|line| format!("    {line}\n"))
                    .collect::<String>();
                format!(
                    "  {} rows from {} table:\n{}",
                    sample.rows.len(),
                    table.name,
                    rows
                )
            }
            _ => String::new(),
        };

        format!("Table: {}\n{}{}\n", table.name, column_lines, sample_text)
    }

    fn format_column_for_llm(&self, table: &Table, column: &Column) -> String {
        let mut annotations = [
            table.primary_key.contains(&column.name).then_some("PK".to_string()),
            (!column.is_nullable).then_some("NOT NULL".to_string()),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        annotations.extend(
            self.foreign_keys
                .iter()
                .filter(|fk| fk.from_table == table.name)
                .filter_map(|fk| {
                    let pos = fk.from_columns.iter().position(|c| *c == column.name)?;
                    let target = fk.to_columns.get(pos).map(String::as_str).unwrap_or("");
                    Some(format!("FK -> {}.{}", fk.to_table, target))
                }),
        );

        if let Some(default) = &column.default {
            annotations.push(format!("DEFAULT {default}"));
        }

        if annotations.is_empty() {
            format!("  - {}: {}\n", column.name, column.data_type)
        } else {
            format!(
                "  - {}: {} ({})\n",
                column.name,
                column.data_type,
                annotations.join(", ")
            )
        }
    }
}

/// Represents a database table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Columns in the table.
    pub columns: Vec<Column>,

    /// Column names that form the primary key.
    pub primary_key: Vec<String>,

    /// Indexes on the table.
    pub indexes: Vec<Index>,

    /// Example rows, filled in by the introspector.
    pub sample: Option<QueryResult>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Represents a column in a table.
#[derive(Debug, Clone, Default)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Data type (e.g., "integer", "varchar(255)").
    pub data_type: String,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default: Option<String>,
}

impl Column {
    /// Creates a new column with the given name and data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }

    /// Sets the default value.
    pub fn with_default(self, default: impl Into<String>) -> Self {
        Self {
            default: Some(default.into()),
            ..self
        }
    }
}

/// Represents a foreign key relationship between tables.
#[derive(Debug, Clone, Default)]
pub struct ForeignKey {
    /// Source table name.
    pub from_table: String,

    /// Source column names.
    pub from_columns: Vec<String>,

    /// Target table name.
    pub to_table: String,

    /// Target column names.
    pub to_columns: Vec<String>,
}

impl ForeignKey {
    /// Creates a new foreign key relationship.
    pub fn new(
        from_table: impl Into<String>,
        from_columns: Vec<String>,
        to_table: impl Into<String>,
        to_columns: Vec<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_columns,
            to_table: to_table.into(),
            to_columns,
        }
    }
}

/// Represents an index on a table.
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Column names included in the index.
    pub columns: Vec<String>,

    /// Whether this is a unique index.
    pub is_unique: bool,
}
