//! Configuration validation.

use super::{Config, ConnectionConfig, DbType, StoreKind};
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    for (alias, conn) in &config.connections {
        if alias.trim().is_empty() {
            return Err(MigrateError::Config("connection alias cannot be empty".into()));
        }
        if alias.contains(['/', '\\']) || alias == "." || alias == ".." {
            return Err(MigrateError::Config(format!(
                "connections.{}: alias cannot contain path separators",
                alias
            )));
        }
        validate_connection(alias, conn)?;
    }

    let migrations = &config.migrations;
    validate_identifier(&migrations.units_table)
        .map_err(|e| MigrateError::Config(format!("migrations.units_table: {}", e)))?;
    validate_identifier(&migrations.evolutions_table)
        .map_err(|e| MigrateError::Config(format!("migrations.evolutions_table: {}", e)))?;

    match migrations.store {
        StoreKind::Files => {
            if migrations.dir.as_os_str().is_empty() {
                return Err(MigrateError::Config("migrations.dir is required".into()));
            }
        }
        StoreKind::Database => {
            let meta = migrations.meta_alias.as_deref().ok_or_else(|| {
                MigrateError::Config(
                    "migrations.meta_alias is required when migrations.store is 'database'".into(),
                )
            })?;
            if !config.connections.contains_key(meta) {
                return Err(MigrateError::Config(format!(
                    "migrations.meta_alias '{}' is not a configured connection",
                    meta
                )));
            }
        }
    }

    Ok(())
}

fn validate_connection(alias: &str, conn: &ConnectionConfig) -> Result<()> {
    let field = |name: &str| format!("connections.{}.{}", alias, name);

    match conn.r#type {
        DbType::Sqlite | DbType::Libsql => {
            if conn.filename.as_ref().map_or(true, |f| f.as_os_str().is_empty()) {
                return Err(MigrateError::Config(format!("{} is required", field("filename"))));
            }
        }
        DbType::Snowflake => {
            if conn.account.as_deref().map_or(true, str::is_empty) {
                return Err(MigrateError::Config(format!("{} is required", field("account"))));
            }
            if conn.user.is_empty() {
                return Err(MigrateError::Config(format!("{} is required", field("user"))));
            }
        }
        DbType::Mysql | DbType::Tidb | DbType::Mssql | DbType::Oracle => {
            if conn.host.is_empty() {
                return Err(MigrateError::Config(format!("{} is required", field("host"))));
            }
            if conn.database.is_empty() {
                return Err(MigrateError::Config(format!("{} is required", field("database"))));
            }
            if conn.user.is_empty() {
                return Err(MigrateError::Config(format!("{} is required", field("user"))));
            }
        }
    }

    if conn.max_connections == 0 {
        return Err(MigrateError::Config(format!(
            "{} must be at least 1",
            field("max_connections")
        )));
    }
    if conn.port == Some(0) {
        return Err(MigrateError::Config(format!("{} cannot be 0", field("port"))));
    }
    Ok(())
}
