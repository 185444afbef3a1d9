//! Error types for the schema and migration library.

use std::time::Duration;
use thiserror::Error;

/// Reasons a migration request cannot be ordered against the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The requested unit is not part of the pending (or applied) set.
    #[error("migration '{0}' not found")]
    NotFound(String),

    /// The applied ledger holds more rows than there are known units.
    #[error("dirty migration history: {applied} applied ledger rows but only {units} units")]
    Dirty { units: usize, applied: usize },

    /// The unit has been applied and is not the most recent one.
    #[error("migration '{0}' is applied; revert it before deleting")]
    Applied(String),
}

/// Main error type for schema and migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, unknown alias, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The database could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Catalog query failed or returned an unexpected shape
    #[error("Introspection failed: {0}")]
    Introspection(String),

    /// Table is missing or its name is invalid
    #[error("Table not found or invalid table name: {0}")]
    TableNotFound(String),

    /// Data type rejected by the sanitizer
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    /// Default value rejected by the sanitizer
    #[error("Invalid default value: {0}")]
    InvalidDefaultValue(String),

    /// A generated statement failed against the live engine
    #[error("DDL execution failed after {elapsed:?}: {message}\n  Statement: {statement}")]
    DdlExecution {
        statement: String,
        elapsed: Duration,
        message: String,
    },

    /// Requested migration target cannot be ordered against the ledger
    #[error("Migration order error: {0}")]
    MigrationOrder(#[from] OrderError),

    /// The dialect does not implement the requested object kind
    #[error("{operation} is not supported by the {dialect} dialect")]
    UnsupportedOperation { dialect: String, operation: String },

    /// A driver call exceeded the configured deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// sqlx driver error (MySQL, TiDB, SQLite, libsql)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// SQL Server driver error
    #[cfg(feature = "mssql")]
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Wrap a driver failure with the offending statement and elapsed time.
    pub fn ddl(statement: impl Into<String>, elapsed: Duration, message: impl ToString) -> Self {
        MigrateError::DdlExecution {
            statement: statement.into(),
            elapsed,
            message: message.to_string(),
        }
    }

    pub fn table_not_found(table: impl Into<String>) -> Self {
        MigrateError::TableNotFound(table.into())
    }

    /// Create an UnsupportedOperation error
    pub fn unsupported(dialect: impl Into<String>, operation: impl Into<String>) -> Self {
        MigrateError::UnsupportedOperation {
            dialect: dialect.into(),
            operation: operation.into(),
        }
    }

    /// True for failures that must not be retried without operator action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::MigrationOrder(OrderError::Dirty { .. }) | MigrateError::Config(_)
        )
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Connection(_) | MigrateError::Pool { .. } | MigrateError::Timeout(_) => 3,
            MigrateError::Introspection(_) | MigrateError::TableNotFound(_) => 4,
            MigrateError::InvalidDataType(_)
            | MigrateError::InvalidDefaultValue(_)
            | MigrateError::UnsupportedOperation { .. } => 5,
            MigrateError::DdlExecution { .. } => 6,
            MigrateError::MigrationOrder(OrderError::NotFound(_)) => 7,
            MigrateError::MigrationOrder(OrderError::Dirty { .. }) => 8,
            MigrateError::MigrationOrder(OrderError::Applied(_)) => 9,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for schema and migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinguish_dirty_history() {
        let dirty = MigrateError::from(OrderError::Dirty { units: 1, applied: 2 });
        let missing = MigrateError::from(OrderError::NotFound("x".into()));
        assert_eq!(dirty.exit_code(), 8);
        assert_eq!(missing.exit_code(), 7);
        assert!(dirty.is_fatal());
        assert!(!missing.is_fatal());
    }

    #[test]
    fn test_ddl_error_mentions_statement() {
        let err = MigrateError::ddl("DROP TABLE t", Duration::from_millis(12), "no such table");
        let text = err.to_string();
        assert!(text.contains("DROP TABLE t"));
        assert!(text.contains("no such table"));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_format_detailed_includes_cause_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = MigrateError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: missing file"));
    }
}
