//! Query safety classification module.
//!
//! Parses generated SQL and classifies it as safe, mutating, or destructive so
//! the executor can refuse anything that is not a read-only statement.

mod parser;

pub use parser::{classify_sql, SqlClassifier};

use std::fmt;

/// Safety level classification for SQL queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SafetyLevel {
    /// Read-only queries (SELECT, EXPLAIN, SHOW).
    Safe,
    /// Data modification (INSERT, UPDATE, MERGE).
    Mutating,
    /// Data loss or schema changes (DELETE, DROP, TRUNCATE, ALTER, CREATE, GRANT),
    /// and anything that could not be understood.
    Destructive,
}

impl SafetyLevel {
    /// Returns true if executing the statement cannot change the database.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Safe)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Mutating => write!(f, "Mutating"),
            Self::Destructive => write!(f, "Destructive"),
        }
    }
}

/// The type of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Truncate,
    Alter,
    Create,
    Grant,
    Revoke,
    Explain,
    Show,
    Merge,
    /// Multiple statements detected; contains the most dangerous type.
    Multiple(Box<StatementType>),
    /// Statement type could not be determined.
    Unknown,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Drop => write!(f, "DROP"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Alter => write!(f, "ALTER"),
            Self::Create => write!(f, "CREATE"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::Merge => write!(f, "MERGE"),
            Self::Multiple(inner) => write!(f, "Multiple ({})", inner),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of classifying a SQL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    /// The determined safety level.
    pub level: SafetyLevel,
    /// The type of statement(s) detected.
    pub statement_type: StatementType,
    /// Why the statement could not be classified, if it could not.
    pub parse_error: Option<String>,
}

impl ClassificationResult {
    /// Creates a new classification result.
    pub fn new(level: SafetyLevel, statement_type: StatementType) -> Self {
        Self {
            level,
            statement_type,
            parse_error: None,
        }
    }

    /// Classification for SQL the parser rejected.
    pub fn unparseable(error: impl Into<String>) -> Self {
        Self {
            level: SafetyLevel::Destructive,
            statement_type: StatementType::Unknown,
            parse_error: Some(error.into()),
        }
    }

    /// Returns true if the statement may be executed under a read-only policy.
    pub fn is_read_only(&self) -> bool {
        self.level.is_read_only()
    }

    /// Explains why a read-only policy refuses this statement.
    ///
    /// Returns `None` when the statement is allowed.
    pub fn refusal_reason(&self) -> Option<String> {
        if self.is_read_only() {
            return None;
        }
        Some(match &self.parse_error {
            Some(error) => format!("refusing to execute a statement that could not be parsed ({error})"),
            None => format!(
                "refusing to execute a {} statement; only read-only queries are allowed",
                self.statement_type
            ),
        })
    }
}
