//! Snowflake driver over ODBC.
//!
//! Connection string format:
//! `Driver={SnowflakeDSIIDriver};Server=<account>.snowflakecomputing.com;UID=..;PWD=..;Database=..;Schema=..;Warehouse=..;Role=..`

use async_trait::async_trait;
use tracing::info;

use super::catalog;
use super::SnowflakeDialect;
use crate::config::{ConnectionConfig, DbType};
use crate::core::schema::{Column, Index, Relation, Sequence, VersionInfo, View};
use crate::core::statement::Statement;
use crate::core::traits::{AdminHandle, Dialect, Driver};
use crate::core::value::Record;
use crate::drivers::common::{self, odbc::attribute, odbc::OdbcPool};
use crate::error::{MigrateError, Result};

const DEFAULT_ODBC_DRIVER: &str = "SnowflakeDSIIDriver";

/// Schema used when none is configured.
pub const DEFAULT_SCHEMA: &str = "PUBLIC";

fn server(config: &ConnectionConfig) -> Result<String> {
    match config.account.as_deref().filter(|a| !a.is_empty()) {
        Some(account) => Ok(format!("{}.snowflakecomputing.com", account)),
        None if !config.host.is_empty() => Ok(config.host.clone()),
        None => Err(MigrateError::Config(
            "Snowflake connection requires 'account' or 'host'".into(),
        )),
    }
}

fn connection_string(config: &ConnectionConfig, with_database: bool) -> Result<String> {
    let driver = config.odbc_driver.as_deref().unwrap_or(DEFAULT_ODBC_DRIVER);
    let mut s = format!(
        "Driver={{{}}};Server={};UID={};PWD={};",
        driver,
        server(config)?,
        attribute(&config.user),
        attribute(&config.password)
    );
    if with_database && !config.database.is_empty() {
        s.push_str(&format!("Database={};", attribute(&config.database)));
        let schema = config.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
        s.push_str(&format!("Schema={};", attribute(schema)));
    }
    if let Some(warehouse) = &config.warehouse {
        s.push_str(&format!("Warehouse={};", attribute(warehouse)));
    }
    if let Some(role) = &config.role {
        s.push_str(&format!("Role={};", attribute(role)));
    }
    Ok(s)
}

/// Snowflake driver bound to one database and schema.
pub struct SnowflakeDriver {
    pool: OdbcPool,
    dialect: SnowflakeDialect,
    schema: String,
}

impl SnowflakeDriver {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let schema = config
            .schema
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        let target = format!("{}/{}.{}", server(config)?, config.database, schema);
        let pool = OdbcPool::connect(connection_string(config, true)?, "Snowflake", &target).await?;
        Ok(Self {
            pool,
            dialect: SnowflakeDialect::new(Some(&schema)),
            schema,
        })
    }

    fn schema_literal(&self) -> String {
        self.dialect.quoting().value(&self.schema)
    }

    fn qualified(&self, table: &str) -> Result<String> {
        let q = self.dialect.quoting();
        Ok(format!("{}.{}", q.ident(&self.schema)?, q.ident(table)?))
    }

    async fn fetch(&self, sql: &str, context: &str) -> Result<Vec<Record>> {
        self.pool
            .query(sql)
            .await
            .map_err(|e| MigrateError::Introspection(format!("{} failed: {}", context, e)))
    }

    async fn imported_keys(&self, scope: &str) -> Result<Vec<Relation>> {
        let rows = self
            .fetch(&catalog::imported_keys(scope), "loading Snowflake foreign keys")
            .await?;
        rows.iter()
            .map(|r| common::relation_from_record(&catalog::relation_record(r)))
            .collect()
    }
}

#[async_trait]
impl Driver for SnowflakeDriver {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> DbType {
        DbType::Snowflake
    }

    async fn test_connection(&self) -> Result<()> {
        self.pool.test_connection().await
    }

    async fn version(&self) -> Result<VersionInfo> {
        let rows = self.fetch(catalog::VERSION, "reading server version").await?;
        let raw = rows.first().map(|r| r.text("version")).unwrap_or_default();
        Ok(VersionInfo::parse(&raw))
    }

    async fn table_list(&self) -> Result<Vec<String>> {
        let rows = self
            .fetch(&catalog::tables(&self.schema_literal()), "listing Snowflake tables")
            .await?;
        Ok(common::first_column(&rows))
    }

    async fn schema_list(&self) -> Result<Vec<String>> {
        let rows = self.fetch(catalog::SCHEMAS, "listing Snowflake schemas").await?;
        Ok(common::first_column(&rows))
    }

    async fn column_list(&self, table: &str) -> Result<Vec<Column>> {
        let sql = catalog::columns(&self.schema_literal(), &self.dialect.quoting().value(table));
        let rows = self.fetch(&sql, "loading Snowflake columns").await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let pk_rows = self
            .fetch(&catalog::primary_keys(&self.qualified(table)?), "loading Snowflake primary key")
            .await?;
        let pk_columns = catalog::primary_key_columns(&pk_rows);
        Ok(catalog::columns_from_records(table, &rows, &pk_columns))
    }

    /// Snowflake has no secondary indexes.
    async fn index_list(&self, _table: &str) -> Result<Vec<Index>> {
        Ok(Vec::new())
    }

    async fn relation_list(&self, table: &str) -> Result<Vec<Relation>> {
        self.imported_keys(&format!("TABLE {}", self.qualified(table)?))
            .await
    }

    async fn relation_list_all(&self) -> Result<Vec<Relation>> {
        let scope = format!("SCHEMA {}", self.dialect.quoting().ident(&self.schema)?);
        self.imported_keys(&scope).await
    }

    async fn view_list(&self) -> Result<Vec<View>> {
        let rows = self
            .fetch(&catalog::views(&self.schema_literal()), "loading Snowflake views")
            .await?;
        common::views_from_records(&rows)
            .into_iter()
            .map(|mut v| {
                v.definition = common::definition_body(&v.definition)?;
                Ok(v)
            })
            .collect()
    }

    async fn sequence_list(&self) -> Result<Vec<Sequence>> {
        let rows = self
            .fetch(&catalog::sequences(&self.schema_literal()), "loading Snowflake sequences")
            .await?;
        Ok(common::sequences_from_records(&rows))
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>> {
        self.pool.query(sql).await
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<()> {
        // DDL commits implicitly on Snowflake as well.
        let sql: Vec<String> = statements.iter().map(|s| self.dialect.finalize(s)).collect();
        self.pool.execute_batch(&sql).await
    }

    async fn pk_constraint(&self, table: &str) -> Result<Option<String>> {
        let rows = self
            .fetch(&catalog::primary_keys(&self.qualified(table)?), "loading Snowflake primary key")
            .await?;
        Ok(rows.first().and_then(|r| r.opt_text("constraint_name")))
    }

    async fn close(&self) {}
}

/// Account-level handle for database provisioning.
pub struct SnowflakeAdmin {
    pool: OdbcPool,
    dialect: SnowflakeDialect,
}

impl SnowflakeAdmin {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let target = server(config)?;
        let pool = OdbcPool::connect(connection_string(config, false)?, "Snowflake", &target).await?;
        info!("Connected to Snowflake account: {}", target);
        Ok(Self {
            pool,
            dialect: SnowflakeDialect::default(),
        })
    }

    async fn run(&self, sql: String) -> Result<()> {
        self.pool.execute_batch(&[sql]).await
    }
}

#[async_trait]
impl AdminHandle for SnowflakeAdmin {
    async fn has_database(&self, name: &str) -> Result<bool> {
        Ok(self
            .database_list()
            .await?
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name)))
    }

    async fn database_list(&self) -> Result<Vec<String>> {
        let rows = self.pool.query("SHOW DATABASES").await?;
        Ok(rows.iter().map(|r| r.text("name")).collect())
    }

    async fn create_database_if_not_exists(&self, name: &str) -> Result<()> {
        let sql = format!("CREATE DATABASE IF NOT EXISTS {}", self.dialect.quoting().ident(name)?);
        self.run(sql).await?;
        info!("Created Snowflake database {}", name);
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let sql = format!("DROP DATABASE IF EXISTS {}", self.dialect.quoting().ident(name)?);
        self.run(sql).await?;
        info!("Dropped Snowflake database {}", name);
        Ok(())
    }

    async fn close(&self) {}
}
