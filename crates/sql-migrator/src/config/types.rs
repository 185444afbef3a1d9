//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Unit store and ledger settings.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Named connections ("aliases").
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

impl Config {
    /// Connection settings for `alias`.
    pub fn connection(&self, alias: &str) -> crate::error::Result<&ConnectionConfig> {
        self.connections
            .get(alias)
            .ok_or_else(|| MigrateError::Config(format!("Unknown alias: '{}'", alias)))
    }
}

/// Where migration units are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Paired `.up.sql` / `.down.sql` files under `dir/<alias>/`.
    #[default]
    Files,

    /// Rows of a bookkeeping table on the meta alias.
    Database,
}

/// Unit store and applied-ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Store kind (default: files).
    #[serde(default)]
    pub store: StoreKind,

    /// Root directory of the file store (default: "migrations").
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Alias holding the bookkeeping table when `store` is `database`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_alias: Option<String>,

    /// Bookkeeping table name (default: "xc_migrations").
    #[serde(default = "default_units_table")]
    pub units_table: String,

    /// Applied-ledger table name in each target database (default: "nc_evolutions").
    #[serde(default = "default_evolutions_table")]
    pub evolutions_table: String,

    /// Prefix SQLite alters with a `SELECT 1 FROM t LIMIT 1` probe (default: true).
    #[serde(default = "default_true")]
    pub sqlite_select_probe: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            dir: default_dir(),
            meta_alias: None,
            units_table: default_units_table(),
            evolutions_table: default_evolutions_table(),
            sqlite_select_probe: true,
        }
    }
}

/// Supported engines, after alias normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DbType {
    Mysql,
    Tidb,
    Mssql,
    Oracle,
    Snowflake,
    Sqlite,
    Libsql,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Mysql => "mysql",
            DbType::Tidb => "tidb",
            DbType::Mssql => "mssql",
            DbType::Oracle => "oracle",
            DbType::Snowflake => "snowflake",
            DbType::Sqlite => "sqlite",
            DbType::Libsql => "libsql",
        }
    }

    /// Default TCP port for network engines.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DbType::Mysql => Some(3306),
            DbType::Tidb => Some(4000),
            DbType::Mssql => Some(1433),
            DbType::Oracle => Some(1521),
            DbType::Snowflake | DbType::Sqlite | DbType::Libsql => None,
        }
    }

    /// File-backed engines address a path instead of a server.
    pub fn is_file_based(&self) -> bool {
        matches!(self, DbType::Sqlite | DbType::Libsql)
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mysql2" | "mariadb" => Ok(DbType::Mysql),
            "tidb" => Ok(DbType::Tidb),
            "mssql" | "sqlserver" | "sql_server" => Ok(DbType::Mssql),
            "oracle" | "oracledb" => Ok(DbType::Oracle),
            "snowflake" => Ok(DbType::Snowflake),
            "sqlite" | "sqlite3" => Ok(DbType::Sqlite),
            "libsql" | "turso" => Ok(DbType::Libsql),
            other => Err(MigrateError::Config(format!(
                "Unknown database type: '{}'. Supported types: mysql, tidb, mssql, oracle, snowflake, sqlite, libsql",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DbType {
    type Error = MigrateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DbType> for String {
    fn from(value: DbType) -> Self {
        value.as_str().to_string()
    }
}

/// One named connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Engine type; aliases such as `mariadb` or `sqlite3` are accepted.
    pub r#type: DbType,

    #[serde(default)]
    pub host: String,

    /// Port (default: the engine's standard port).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name; for Oracle the service name.
    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Schema (MSSQL default "dbo", Snowflake default "PUBLIC", Oracle default the user).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Database file for SQLite/libSQL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<PathBuf>,

    /// Snowflake account identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Encrypt the connection (default: false).
    #[serde(default)]
    pub encrypt: bool,

    /// Trust the server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Deadline applied to every driver call; none when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_timeout_secs: Option<u64>,

    /// ODBC driver name for Oracle/Snowflake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odbc_driver: Option<String>,
}

impl ConnectionConfig {
    /// Minimal configuration for `db_type`; fields are filled in by the caller.
    pub fn new(db_type: DbType) -> Self {
        Self {
            r#type: db_type,
            host: String::new(),
            port: None,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: None,
            filename: None,
            account: None,
            warehouse: None,
            role: None,
            encrypt: false,
            trust_server_cert: false,
            max_connections: default_max_connections(),
            statement_timeout_secs: None,
            odbc_driver: None,
        }
    }

    /// SQLite configuration for a database file.
    pub fn sqlite(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::new(DbType::Sqlite)
        }
    }

    /// Effective port.
    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| self.r#type.default_port())
            .unwrap_or_default()
    }

    /// Effective deadline for driver calls.
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Name of the database this connection targets, for display and provisioning.
    pub fn database_name(&self) -> String {
        match (&self.filename, self.r#type.is_file_based()) {
            (Some(path), true) => path.display().to_string(),
            _ => self.database.clone(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("filename", &self.filename)
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("max_connections", &self.max_connections)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .field("odbc_driver", &self.odbc_driver)
            .finish()
    }
}

// Default value functions for serde
fn default_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_units_table() -> String {
    "xc_migrations".to_string()
}

fn default_evolutions_table() -> String {
    "nc_evolutions".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_true() -> bool {
    true
}
