//! Driver catalog for explicit dependency injection.
//!
//! The [`DriverCatalog`] maps engine types to factories that open drivers and
//! admin handles. It is explicitly constructed and handed to the alias
//! registry, so tests can register in-memory fakes next to (or instead of)
//! the built-in engines.
//!
//! # Design Rationale
//!
//! - **No global state**: no linkme/inventory registration
//! - **Explicit registration**: clear, deterministic initialization order
//! - **Feature-gated**: built-in engines are registered per Cargo feature

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConnectionConfig, DbType, MigrationsConfig};
use crate::error::{MigrateError, Result};

use super::traits::{AdminHandle, Driver};

/// Opens connections for one engine.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Connect to the database named by `config`.
    async fn connect(
        &self,
        config: &ConnectionConfig,
        migrations: &MigrationsConfig,
    ) -> Result<Arc<dyn Driver>>;

    /// Connect without binding to the database, for provisioning.
    async fn connect_admin(&self, config: &ConnectionConfig) -> Result<Arc<dyn AdminHandle>>;
}

/// Registry of driver factories keyed by engine.
///
/// # Example
///
/// ```rust,ignore
/// let mut catalog = DriverCatalog::new();
/// catalog.register(DbType::Sqlite, Arc::new(MyFactory));
/// let registry = AliasRegistry::new(config, Arc::new(catalog));
/// ```
#[derive(Default)]
pub struct DriverCatalog {
    factories: HashMap<DbType, Arc<dyn DriverFactory>>,
}

impl DriverCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with every engine compiled into this build.
    pub fn with_builtins() -> Self {
        #[allow(unused_mut)]
        let mut catalog = Self::new();

        #[cfg(feature = "mysql")]
        {
            catalog.register(DbType::Mysql, Arc::new(builtin::MysqlFactory));
            catalog.register(DbType::Tidb, Arc::new(builtin::MysqlFactory));
        }
        #[cfg(feature = "mssql")]
        catalog.register(DbType::Mssql, Arc::new(builtin::MssqlFactory));
        #[cfg(feature = "odbc")]
        {
            catalog.register(DbType::Oracle, Arc::new(builtin::OracleFactory));
            catalog.register(DbType::Snowflake, Arc::new(builtin::SnowflakeFactory));
        }
        #[cfg(feature = "sqlite")]
        {
            catalog.register(DbType::Sqlite, Arc::new(builtin::SqliteFactory));
            catalog.register(DbType::Libsql, Arc::new(builtin::SqliteFactory));
        }

        catalog
    }

    /// Register (or replace) the factory for `db_type`.
    pub fn register(&mut self, db_type: DbType, factory: Arc<dyn DriverFactory>) {
        self.factories.insert(db_type, factory);
    }

    pub fn has_driver(&self, db_type: DbType) -> bool {
        self.factories.contains_key(&db_type)
    }

    /// Registered engine names, sorted.
    pub fn driver_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().map(DbType::as_str).collect();
        names.sort_unstable();
        names
    }

    fn require(&self, db_type: DbType) -> Result<&Arc<dyn DriverFactory>> {
        self.factories.get(&db_type).ok_or_else(|| {
            MigrateError::Config(format!(
                "No driver registered for '{}' (enable its Cargo feature). Available: {}",
                db_type,
                self.driver_names().join(", ")
            ))
        })
    }

    pub async fn connect(
        &self,
        config: &ConnectionConfig,
        migrations: &MigrationsConfig,
    ) -> Result<Arc<dyn Driver>> {
        self.require(config.r#type)?.connect(config, migrations).await
    }

    pub async fn connect_admin(&self, config: &ConnectionConfig) -> Result<Arc<dyn AdminHandle>> {
        self.require(config.r#type)?.connect_admin(config).await
    }
}

mod builtin {
    #[allow(unused_imports)]
    use super::*;

    #[cfg(feature = "mysql")]
    pub struct MysqlFactory;

    #[cfg(feature = "mysql")]
    #[async_trait]
    impl DriverFactory for MysqlFactory {
        async fn connect(
            &self,
            config: &ConnectionConfig,
            _migrations: &MigrationsConfig,
        ) -> Result<Arc<dyn Driver>> {
            Ok(Arc::new(crate::drivers::mysql::MysqlDriver::connect(config).await?))
        }

        async fn connect_admin(&self, config: &ConnectionConfig) -> Result<Arc<dyn AdminHandle>> {
            Ok(Arc::new(crate::drivers::mysql::MysqlAdmin::connect(config).await?))
        }
    }

    #[cfg(feature = "mssql")]
    pub struct MssqlFactory;

    #[cfg(feature = "mssql")]
    #[async_trait]
    impl DriverFactory for MssqlFactory {
        async fn connect(
            &self,
            config: &ConnectionConfig,
            _migrations: &MigrationsConfig,
        ) -> Result<Arc<dyn Driver>> {
            Ok(Arc::new(crate::drivers::mssql::MssqlDriver::connect(config).await?))
        }

        async fn connect_admin(&self, config: &ConnectionConfig) -> Result<Arc<dyn AdminHandle>> {
            Ok(Arc::new(crate::drivers::mssql::MssqlAdmin::connect(config).await?))
        }
    }

    #[cfg(feature = "odbc")]
    pub struct OracleFactory;

    #[cfg(feature = "odbc")]
    #[async_trait]
    impl DriverFactory for OracleFactory {
        async fn connect(
            &self,
            config: &ConnectionConfig,
            _migrations: &MigrationsConfig,
        ) -> Result<Arc<dyn Driver>> {
            Ok(Arc::new(crate::drivers::oracle::OracleDriver::connect(config).await?))
        }

        async fn connect_admin(&self, config: &ConnectionConfig) -> Result<Arc<dyn AdminHandle>> {
            Ok(Arc::new(crate::drivers::oracle::OracleAdmin::connect(config).await?))
        }
    }

    #[cfg(feature = "odbc")]
    pub struct SnowflakeFactory;

    #[cfg(feature = "odbc")]
    #[async_trait]
    impl DriverFactory for SnowflakeFactory {
        async fn connect(
            &self,
            config: &ConnectionConfig,
            _migrations: &MigrationsConfig,
        ) -> Result<Arc<dyn Driver>> {
            Ok(Arc::new(crate::drivers::snowflake::SnowflakeDriver::connect(config).await?))
        }

        async fn connect_admin(&self, config: &ConnectionConfig) -> Result<Arc<dyn AdminHandle>> {
            Ok(Arc::new(crate::drivers::snowflake::SnowflakeAdmin::connect(config).await?))
        }
    }

    #[cfg(feature = "sqlite")]
    pub struct SqliteFactory;

    #[cfg(feature = "sqlite")]
    #[async_trait]
    impl DriverFactory for SqliteFactory {
        async fn connect(
            &self,
            config: &ConnectionConfig,
            migrations: &MigrationsConfig,
        ) -> Result<Arc<dyn Driver>> {
            let driver =
                crate::drivers::sqlite::SqliteDriver::connect(config, migrations.sqlite_select_probe)
                    .await?;
            Ok(Arc::new(driver))
        }

        async fn connect_admin(&self, config: &ConnectionConfig) -> Result<Arc<dyn AdminHandle>> {
            Ok(Arc::new(crate::drivers::sqlite::SqliteAdmin::new(config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_catalog_reports_missing_driver() {
        let catalog = DriverCatalog::new();
        assert!(!catalog.has_driver(DbType::Oracle));
        assert!(catalog.driver_names().is_empty());
        assert!(catalog.require(DbType::Oracle).is_err());
    }

    #[cfg(all(feature = "sqlite", feature = "mysql"))]
    #[test]
    fn test_with_builtins_registers_feature_engines() {
        let catalog = DriverCatalog::with_builtins();
        assert!(catalog.has_driver(DbType::Sqlite));
        assert!(catalog.has_driver(DbType::Libsql));
        assert!(catalog.has_driver(DbType::Tidb));
        let names = catalog.driver_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_connect_sqlite_through_catalog() {
        let dir = tempfile::TempDir::new().unwrap();
        let catalog = DriverCatalog::with_builtins();
        let config = ConnectionConfig::sqlite(dir.path().join("c.db"));
        let driver = catalog
            .connect(&config, &MigrationsConfig::default())
            .await
            .unwrap();
        assert_eq!(driver.db_type(), DbType::Sqlite);
        assert!(driver.dialect().select_probe());
        driver.test_connection().await.unwrap();
    }
}
