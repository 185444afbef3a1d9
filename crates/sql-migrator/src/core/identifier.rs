//! Centralized identifier validation and quoting.
//!
//! SQL identifiers (table names, column names, schema names) cannot be bound as
//! parameters, so every identifier that reaches generated DDL goes through this
//! module:
//!
//! 1. Validate identifiers for suspicious patterns (null bytes, excessive length)
//! 2. Apply dialect-specific quoting (backticks, brackets, double quotes)
//! 3. Escape the closing quote character inside the name
//!
//! String literals get the same treatment through [`quote_literal`], which knows
//! whether the engine treats backslash as an escape character.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};

/// Maximum identifier length (conservative limit across engines).
/// - SQL Server: 128 characters
/// - Oracle 12.2+: 128 bytes
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// How a dialect wraps identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteStyle {
    /// `` `name` `` (MySQL, MariaDB, TiDB)
    Backtick,
    /// `[name]` (SQL Server)
    Bracket,
    /// `"name"` (Oracle, Snowflake, SQLite)
    DoubleQuote,
}

/// How a dialect escapes string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralStyle {
    /// Single quotes doubled.
    Standard,
    /// Single quotes doubled and backslashes escaped (MySQL default `sql_mode`).
    Backslash,
}

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote an identifier in the given style.
///
/// ```ignore
/// assert_eq!(quote_identifier(QuoteStyle::Bracket, "a]b")?, "[a]]b]");
/// ```
pub fn quote_identifier(style: QuoteStyle, name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(match style {
        QuoteStyle::Backtick => format!("`{}`", name.replace('`', "``")),
        QuoteStyle::Bracket => format!("[{}]", name.replace(']', "]]")),
        QuoteStyle::DoubleQuote => format!("\"{}\"", name.replace('"', "\"\"")),
    })
}

/// Quote a schema-qualified identifier. An empty schema yields the bare name.
pub fn qualify(style: QuoteStyle, schema: Option<&str>, name: &str) -> Result<String> {
    match schema {
        Some(schema) if !schema.is_empty() => Ok(format!(
            "{}.{}",
            quote_identifier(style, schema)?,
            quote_identifier(style, name)?
        )),
        _ => quote_identifier(style, name),
    }
}

/// Quote a string literal.
pub fn quote_literal(style: LiteralStyle, value: &str) -> String {
    match style {
        LiteralStyle::Standard => format!("'{}'", value.replace('\'', "''")),
        LiteralStyle::Backslash => {
            format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
        }
    }
}

/// Escape a value for embedding inside an already-quoted catalog predicate.
pub fn escape_literal_body(value: &str) -> String {
    value.replace('\'', "''")
}
