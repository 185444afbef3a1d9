//! Database driver implementations.
//!
//! This module provides engine-specific implementations of the core traits:
//!
//! - [`mysql`]: MySQL, MariaDB and TiDB
//! - [`mssql`]: Microsoft SQL Server
//! - [`oracle`]: Oracle over ODBC
//! - [`snowflake`]: Snowflake over ODBC
//! - [`sqlite`]: SQLite and libSQL
//! - [`common`]: Catalog row parsers and the ODBC pool
//!
//! # Architecture
//!
//! Each driver module contains:
//! - `dialect`: the engine's [`SyntaxTable`](crate::core::traits::SyntaxTable)
//! - `catalog`: catalog queries plus row-to-model parsers (pure, always compiled)
//! - `driver`: `Driver` and `AdminHandle` implementations, behind a feature flag
//!
//! # Adding New Databases
//!
//! 1. Create a module under `drivers/` with `dialect`, `catalog` and `driver`
//! 2. Fill in a `SyntaxTable` and implement `Dialect`
//! 3. Implement `Driver` (and `AdminHandle` if the engine can provision)
//! 4. Register a factory in `DriverCatalog::with_builtins()`
//! 5. Gate the driver with a feature flag in `Cargo.toml`

pub mod common;
pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod snowflake;
pub mod sqlite;

pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use snowflake::SnowflakeDialect;
pub use sqlite::SqliteDialect;

use std::sync::Arc;

use crate::config::{ConnectionConfig, DbType};
use crate::core::traits::Dialect;

/// Dialect for `config` without connecting, used to render plans offline.
pub fn dialect_for(config: &ConnectionConfig, select_probe: bool) -> Arc<dyn Dialect> {
    let schema = config.schema.as_deref();
    match config.r#type {
        DbType::Mysql => Arc::new(MysqlDialect::new()),
        DbType::Tidb => Arc::new(MysqlDialect::tidb()),
        DbType::Mssql => Arc::new(MssqlDialect::new(schema)),
        DbType::Oracle => Arc::new(OracleDialect::new(schema)),
        DbType::Snowflake => Arc::new(SnowflakeDialect::new(schema.or(Some("PUBLIC")))),
        DbType::Sqlite => Arc::new(SqliteDialect::new(select_probe)),
        DbType::Libsql => Arc::new(SqliteDialect::libsql(select_probe)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_each_engine() {
        let cases = [
            (DbType::Mysql, "mysql"),
            (DbType::Tidb, "tidb"),
            (DbType::Mssql, "mssql"),
            (DbType::Oracle, "oracle"),
            (DbType::Snowflake, "snowflake"),
            (DbType::Sqlite, "sqlite"),
            (DbType::Libsql, "libsql"),
        ];
        for (db_type, name) in cases {
            let dialect = dialect_for(&ConnectionConfig::new(db_type), true);
            assert_eq!(dialect.name(), name);
        }
    }

    #[test]
    fn test_dialect_for_schema_defaults() {
        let snowflake = dialect_for(&ConnectionConfig::new(DbType::Snowflake), false);
        assert_eq!(snowflake.schema(), Some("PUBLIC"));
        let sqlite = dialect_for(&ConnectionConfig::new(DbType::Sqlite), false);
        assert!(!sqlite.select_probe());
    }
}
