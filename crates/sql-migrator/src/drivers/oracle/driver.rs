//! Oracle driver over ODBC.
//!
//! Connection string format:
//! `Driver={<odbc_driver>};DBQ=host:port/service;UID=user;PWD=password`

use async_trait::async_trait;
use tracing::info;

use super::catalog;
use super::OracleDialect;
use crate::config::{ConnectionConfig, DbType};
use crate::core::schema::{
    Column, Index, Relation, Routine, RoutineKind, Sequence, Trigger, VersionInfo, View,
};
use crate::core::statement::Statement;
use crate::core::traits::{AdminHandle, Dialect, Driver};
use crate::core::value::Record;
use crate::drivers::common::{self, odbc::attribute, odbc::OdbcPool};
use crate::error::{MigrateError, Result};

/// Driver name registered by the Oracle Instant Client ODBC package.
const DEFAULT_ODBC_DRIVER: &str = "Oracle 21 ODBC driver";

fn connection_string(config: &ConnectionConfig) -> String {
    let driver = config.odbc_driver.as_deref().unwrap_or(DEFAULT_ODBC_DRIVER);
    format!(
        "Driver={{{}}};DBQ={}:{}/{};UID={};PWD={};",
        driver,
        config.host,
        config.port(),
        config.database,
        attribute(&config.user),
        attribute(&config.password)
    )
}

fn target(config: &ConnectionConfig) -> String {
    format!("{}:{}/{}", config.host, config.port(), config.database)
}

/// Oracle driver bound to one schema (user).
pub struct OracleDriver {
    pool: OdbcPool,
    dialect: OracleDialect,
    owner: String,
}

impl OracleDriver {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pool = OdbcPool::connect(connection_string(config), "Oracle", &target(config)).await?;
        let dialect = OracleDialect::new(config.schema.as_deref());
        let owner = catalog::owner(dialect.quoting(), dialect.schema());
        Ok(Self {
            pool,
            dialect,
            owner,
        })
    }

    fn literal(&self, value: &str) -> String {
        self.dialect.quoting().value(value)
    }

    async fn fetch(&self, sql: &str, context: &str) -> Result<Vec<Record>> {
        self.pool
            .query(sql)
            .await
            .map_err(|e| MigrateError::Introspection(format!("{} failed: {}", context, e)))
    }

    async fn routines(&self, kind: RoutineKind) -> Result<Vec<Routine>> {
        let rows = self
            .fetch(&catalog::routines(&self.owner, kind.keyword()), "loading Oracle routines")
            .await?;
        Ok(common::routines_from_records(&rows, kind))
    }
}

#[async_trait]
impl Driver for OracleDriver {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> DbType {
        DbType::Oracle
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
            .fetch(&catalog::tables(&self.owner), "listing Oracle tables")
            .await?;
        Ok(common::first_column(&rows))
    }

    async fn schema_list(&self) -> Result<Vec<String>> {
        let rows = self.fetch(catalog::SCHEMAS, "listing Oracle schemas").await?;
        Ok(common::first_column(&rows))
    }

    async fn column_list(&self, table: &str) -> Result<Vec<Column>> {
        let sql = catalog::columns(&self.owner, &self.literal(table));
        let rows = self.fetch(&sql, "loading Oracle columns").await?;
        Ok(catalog::columns_from_records(table, &rows))
    }

    async fn index_list(&self, table: &str) -> Result<Vec<Index>> {
        let sql = catalog::indexes(&self.owner, &self.literal(table));
        let rows = self.fetch(&sql, "loading Oracle indexes").await?;
        Ok(common::indexes_from_records(&rows))
    }

    async fn relation_list(&self, table: &str) -> Result<Vec<Relation>> {
        let sql = catalog::relations(&self.owner, Some(&self.literal(table)));
        let rows = self.fetch(&sql, "loading Oracle foreign keys").await?;
        common::relations_from_records(&rows)
    }

    async fn relation_list_all(&self) -> Result<Vec<Relation>> {
        let sql = catalog::relations(&self.owner, None);
        let rows = self.fetch(&sql, "loading Oracle foreign keys").await?;
        common::relations_from_records(&rows)
    }

    async fn trigger_list(&self, table: &str) -> Result<Vec<Trigger>> {
        let sql = catalog::triggers(&self.owner, &self.literal(table));
        let rows = self.fetch(&sql, "loading Oracle triggers").await?;
        common::triggers_from_records(&rows)?
            .into_iter()
            .map(|mut t| {
                t.statement = common::unwrap_block(&t.statement)?;
                Ok(t)
            })
            .collect()
    }

    async fn view_list(&self) -> Result<Vec<View>> {
        let rows = self
            .fetch(&catalog::views(&self.owner), "loading Oracle views")
            .await?;
        Ok(common::views_from_records(&rows))
    }

    async fn function_list(&self) -> Result<Vec<Routine>> {
        self.routines(RoutineKind::Function).await
    }

    async fn procedure_list(&self) -> Result<Vec<Routine>> {
        self.routines(RoutineKind::Procedure).await
    }

    async fn sequence_list(&self) -> Result<Vec<Sequence>> {
        let rows = self
            .fetch(&catalog::sequences(&self.owner), "loading Oracle sequences")
            .await?;
        Ok(common::sequences_from_records(&rows))
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>> {
        self.pool.query(sql).await
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<()> {
        // DDL commits implicitly on Oracle; rollback only undoes ledger DML.
        let sql: Vec<String> = statements.iter().map(|s| self.dialect.finalize(s)).collect();
        self.pool.execute_batch(&sql).await
    }

    async fn pk_constraint(&self, table: &str) -> Result<Option<String>> {
        let sql = catalog::pk_constraint(&self.owner, &self.literal(table));
        let rows = self.fetch(&sql, "reading Oracle primary key").await?;
        Ok(rows.first().and_then(|r| r.opt_text("name")))
    }

    async fn close(&self) {}
}

/// Instance-level handle. Schemas are users on Oracle and are not provisioned here.
pub struct OracleAdmin {
    pool: OdbcPool,
}

impl OracleAdmin {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pool = OdbcPool::connect(connection_string(config), "Oracle", &target(config)).await?;
        info!("Connected to Oracle instance: {}", target(config));
        Ok(Self { pool })
    }
}

#[async_trait]
impl AdminHandle for OracleAdmin {
    async fn has_database(&self, name: &str) -> Result<bool> {
        Ok(self
            .database_list()
            .await?
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name)))
    }

    async fn database_list(&self) -> Result<Vec<String>> {
        let rows = self.pool.query(catalog::SCHEMAS).await?;
        Ok(common::first_column(&rows))
    }

    async fn create_database_if_not_exists(&self, _name: &str) -> Result<()> {
        Err(MigrateError::unsupported("oracle", "database create"))
    }

    async fn drop_database(&self, _name: &str) -> Result<()> {
        Err(MigrateError::unsupported("oracle", "database drop"))
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string() {
        let mut config = ConnectionConfig::new(DbType::Oracle);
        config.host = "db.local".into();
        config.database = "ORCLPDB1".into();
        config.user = "app".into();
        config.password = "p;w".into();
        let s = connection_string(&config);
        assert!(s.starts_with("Driver={Oracle 21 ODBC driver};"));
        assert!(s.contains("DBQ=db.local:1521/ORCLPDB1;"));
        assert!(s.contains("PWD={p;w};"));
    }
}
