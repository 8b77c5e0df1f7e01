//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with the dialect of the connected backend to parse SQL and
//! classify statements by their safety level.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::db::DatabaseBackend;

use super::{ClassificationResult, SafetyLevel, StatementType};

/// SQL classifier that parses and classifies SQL queries.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: Box<dyn Dialect + Send + Sync>,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    /// Creates a classifier using the PostgreSQL dialect.
    pub fn new() -> Self {
        Self::for_backend(DatabaseBackend::Postgres)
    }

    /// Creates a classifier that parses with the given backend's dialect.
    pub fn for_backend(backend: DatabaseBackend) -> Self {
        let dialect: Box<dyn Dialect + Send + Sync> = match backend {
            DatabaseBackend::Postgres => Box::new(PostgreSqlDialect {}),
            DatabaseBackend::Sqlite => Box::new(SQLiteDialect {}),
        };
        Self { dialect }
    }

    /// Classifies a SQL string and returns the classification result.
    ///
    /// SQL that cannot be parsed is treated as destructive.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        let statements = match Parser::parse_sql(self.dialect.as_ref(), sql) {
            Ok(statements) => statements,
            Err(e) => return ClassificationResult::unparseable(e.to_string()),
        };

        match statements.as_slice() {
            [] => ClassificationResult::unparseable("empty statement"),
            [statement] => {
                let (level, stmt_type) = classify_statement(statement);
                ClassificationResult::new(level, stmt_type)
            }
            _ => {
                // Multiple statements: use the most dangerous classification
                let (level, stmt_type) = statements
                    .iter()
                    .map(classify_statement)
                    .fold((SafetyLevel::Safe, StatementType::Select), most_dangerous);
                ClassificationResult::new(level, StatementType::Multiple(Box::new(stmt_type)))
            }
        }
    }
}

/// Convenience function to classify PostgreSQL without creating a classifier instance.
pub fn classify_sql(sql: &str) -> ClassificationResult {
    SqlClassifier::new().classify(sql)
}

/// Keeps the more dangerous of two classifications; ties keep the first.
fn most_dangerous(
    current: (SafetyLevel, StatementType),
    candidate: (SafetyLevel, StatementType),
) -> (SafetyLevel, StatementType) {
    if candidate.0 > current.0 {
        candidate
    } else {
        current
    }
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> (SafetyLevel, StatementType) {
    match statement {
        // Query: may contain data-modifying CTEs, so recurse
        Statement::Query(query) => classify_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            if *analyze {
                // EXPLAIN ANALYZE executes the inner statement
                let (inner_level, _) = classify_statement(statement);
                (inner_level, StatementType::Explain)
            } else {
                (SafetyLevel::Safe, StatementType::Explain)
            }
        }
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => (SafetyLevel::Safe, StatementType::Show),

        Statement::Insert(_) => (SafetyLevel::Mutating, StatementType::Insert),
        Statement::Update { .. } => (SafetyLevel::Mutating, StatementType::Update),
        Statement::Merge { .. } => (SafetyLevel::Mutating, StatementType::Merge),

        Statement::Delete(_) => (SafetyLevel::Destructive, StatementType::Delete),
        Statement::Drop { .. } => (SafetyLevel::Destructive, StatementType::Drop),
        Statement::Truncate { .. } => (SafetyLevel::Destructive, StatementType::Truncate),
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateRole { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::Grant { .. } => (SafetyLevel::Destructive, StatementType::Grant),
        Statement::Revoke { .. } => (SafetyLevel::Destructive, StatementType::Revoke),

        // PRAGMA, SET, COPY, transactions and the rest can all change state
        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

/// Classifies a Query by recursively inspecting for data-modifying operations.
fn classify_query(query: &Query) -> (SafetyLevel, StatementType) {
    let ctes = query
        .with
        .iter()
        .flat_map(|with| with.cte_tables.iter())
        .map(|cte| classify_query(&cte.query));

    std::iter::once(classify_set_expr(&query.body))
        .chain(ctes)
        .fold((SafetyLevel::Safe, StatementType::Select), most_dangerous)
}

/// Classifies a SetExpr, detecting mutations and recursing into nested queries.
fn classify_set_expr(set_expr: &SetExpr) -> (SafetyLevel, StatementType) {
    match set_expr {
        // Mutations used as CTE bodies
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => classify_statement(stmt),

        SetExpr::Query(query) => classify_query(query),

        SetExpr::Select(select) => classify_select(select),

        // UNION, INTERSECT, EXCEPT
        SetExpr::SetOperation { left, right, .. } => {
            most_dangerous(classify_set_expr(left), classify_set_expr(right))
        }

        SetExpr::Values(_) | SetExpr::Table(_) => (SafetyLevel::Safe, StatementType::Select),

        #[allow(unreachable_patterns)]
        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

/// Classifies a Select by checking its FROM clause for subqueries.
///
/// `SELECT ... INTO t` creates a table and is never read-only.
fn classify_select(select: &Select) -> (SafetyLevel, StatementType) {
    if select.into.is_some() {
        return (SafetyLevel::Destructive, StatementType::Create);
    }

    select
        .from
        .iter()
        .map(classify_table_with_joins)
        .fold((SafetyLevel::Safe, StatementType::Select), most_dangerous)
}

/// Classifies a TableWithJoins, checking the main relation and all joins.
fn classify_table_with_joins(twj: &TableWithJoins) -> (SafetyLevel, StatementType) {
    std::iter::once(&twj.relation)
        .chain(twj.joins.iter().map(|join| &join.relation))
        .map(classify_table_factor)
        .fold((SafetyLevel::Safe, StatementType::Select), most_dangerous)
}

/// Classifies a TableFactor, recursing into derived tables (subqueries).
fn classify_table_factor(factor: &TableFactor) -> (SafetyLevel, StatementType) {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => (SafetyLevel::Safe, StatementType::Select),
    }
}
