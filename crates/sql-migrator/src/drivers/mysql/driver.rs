//! MySQL/MariaDB/TiDB driver.
//!
//! Uses SQLx for connection pooling and async query execution. Catalog rows
//! are decoded to text and handed to the parsers in [`super::catalog`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column as _, Row, ValueRef};
use tracing::{debug, info};

use super::catalog;
use super::MysqlDialect;
use crate::config::{ConnectionConfig, DbType};
use crate::core::schema::{Column, Index, Relation, Routine, RoutineKind, Trigger, VersionInfo, View};
use crate::core::statement::Statement;
use crate::core::traits::{AdminHandle, Dialect, Driver};
use crate::core::value::Record;
use crate::drivers::common;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

fn connect_options(config: &ConnectionConfig) -> MySqlConnectOptions {
    let ssl_mode = if config.encrypt {
        MySqlSslMode::Required
    } else {
        MySqlSslMode::Preferred
    };
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port())
        .username(&config.user)
        .password(&config.password)
        .ssl_mode(ssl_mode)
}

async fn connect_pool(options: MySqlConnectOptions, max_conns: u32, context: &str) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(max_conns)
        .acquire_timeout(POOL_CONNECTION_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(|e| MigrateError::pool(e, format!("creating MySQL pool ({})", context)))?;

    // Test connection
    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .map_err(|e| MigrateError::pool(e, format!("testing MySQL connection ({})", context)))?;
    Ok(pool)
}

/// Decode one cell as text, trying the wire types catalog and ad-hoc queries return.
fn cell_text(row: &MySqlRow, idx: usize) -> Option<String> {
    let is_null: bool = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
    if is_null {
        return None;
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Some(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(v) = row.try_get::<u64, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return Some(v.to_string());
    }
    row.try_get::<Vec<u8>, _>(idx)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn to_records(rows: &[MySqlRow]) -> Vec<Record> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let columns: Arc<[String]> = first.columns().iter().map(|c| c.name().to_string()).collect();
    rows.iter()
        .map(|row| {
            let values = (0..columns.len()).map(|i| cell_text(row, i)).collect();
            Record::new(columns.clone(), values)
        })
        .collect()
}

/// MySQL-family driver bound to one database.
pub struct MysqlDriver {
    pool: MySqlPool,
    dialect: MysqlDialect,
    db_type: DbType,
    database: String,
}

impl MysqlDriver {
    /// Connect to the configured database. TiDB connections use the TiDB dialect.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let options = connect_options(config).database(&config.database);
        let pool = connect_pool(options, config.max_connections, &config.database).await?;

        let (dialect, label) = match config.r#type {
            DbType::Tidb => (MysqlDialect::tidb(), "TiDB"),
            _ => (MysqlDialect::new(), "MySQL"),
        };
        info!(
            "Connected to {}: {}:{}/{}",
            label,
            config.host,
            config.port(),
            config.database
        );

        Ok(Self {
            pool,
            dialect,
            db_type: config.r#type,
            database: config.database.clone(),
        })
    }

    async fn fetch(&self, sql: &str, params: &[&str], context: &str) -> Result<Vec<Record>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.to_string());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Introspection(format!("{} failed: {}", context, e)))?;
        Ok(to_records(&rows))
    }

    fn is_tidb(&self) -> bool {
        self.db_type == DbType::Tidb
    }

    async fn routines(&self, kind: RoutineKind) -> Result<Vec<Routine>> {
        let keyword = kind.keyword();
        let names = common::first_column(
            &self
                .fetch(catalog::ROUTINES, &[keyword], "loading MySQL routines")
                .await?,
        );
        let column = catalog::show_create_column(keyword);

        let mut routines = Vec::with_capacity(names.len());
        for name in names {
            let sql = format!("SHOW CREATE {} {}", keyword, self.dialect.quoting().ident(&name)?);
            let rows = self.fetch(&sql, &[], "reading routine definition").await?;
            // NULL definition: the user lacks privileges on the routine body
            if let Some(definition) = rows.first().and_then(|r| r.opt_text(&column)) {
                routines.push(Routine {
                    name,
                    schema: None,
                    kind,
                    definition,
                });
            }
        }
        Ok(routines)
    }
}

#[async_trait]
impl Driver for MysqlDriver {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> DbType {
        self.db_type
    }

    async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL connection"))?;
        Ok(())
    }

    async fn version(&self) -> Result<VersionInfo> {
        let sql = if self.is_tidb() {
            "SELECT tidb_version() AS version"
        } else {
            "SELECT VERSION() AS version"
        };
        let rows = self.fetch(sql, &[], "reading server version").await?;
        let raw = rows.first().map(|r| r.text("version")).unwrap_or_default();
        Ok(VersionInfo::parse(&raw))
    }

    async fn table_list(&self) -> Result<Vec<String>> {
        let rows = self.fetch(catalog::TABLES, &[], "listing MySQL tables").await?;
        Ok(common::first_column(&rows))
    }

    async fn schema_list(&self) -> Result<Vec<String>> {
        Ok(vec![self.database.clone()])
    }

    async fn column_list(&self, table: &str) -> Result<Vec<Column>> {
        let rows = self
            .fetch(catalog::COLUMNS, &[table], "loading MySQL columns")
            .await?;
        Ok(catalog::columns_from_records(table, &rows))
    }

    async fn index_list(&self, table: &str) -> Result<Vec<Index>> {
        let rows = self
            .fetch(catalog::INDEXES, &[table], "loading MySQL indexes")
            .await?;
        let indexes = common::indexes_from_records(&rows);
        if self.is_tidb() {
            return Ok(catalog::strip_tidb_rowid(indexes));
        }
        Ok(indexes)
    }

    async fn relation_list(&self, table: &str) -> Result<Vec<Relation>> {
        let rows = self
            .fetch(&catalog::relations_query(), &[table], "loading MySQL foreign keys")
            .await?;
        common::relations_from_records(&rows)
    }

    async fn relation_list_all(&self) -> Result<Vec<Relation>> {
        let rows = self
            .fetch(&catalog::all_relations_query(), &[], "loading MySQL foreign keys")
            .await?;
        common::relations_from_records(&rows)
    }

    async fn trigger_list(&self, table: &str) -> Result<Vec<Trigger>> {
        let rows = self
            .fetch(catalog::TRIGGERS, &[table], "loading MySQL triggers")
            .await?;
        common::triggers_from_records(&rows)
    }

    async fn view_list(&self) -> Result<Vec<View>> {
        let rows = self.fetch(catalog::VIEWS, &[], "loading MySQL views").await?;
        Ok(common::views_from_records(&rows))
    }

    async fn function_list(&self) -> Result<Vec<Routine>> {
        self.routines(RoutineKind::Function).await
    }

    async fn procedure_list(&self) -> Result<Vec<Routine>> {
        self.routines(RoutineKind::Procedure).await
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>> {
        let rows = sqlx::raw_sql(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Introspection(format!("query failed: {}", e)))?;
        Ok(to_records(&rows))
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        // DDL commits implicitly on MySQL; the transaction only spans DML.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrateError::pool(e, "beginning MySQL transaction"))?;

        for statement in statements {
            let sql = self.dialect.finalize(statement);
            debug!("Executing on MySQL: {}", sql);
            let started = Instant::now();
            sqlx::Executor::execute(
                &mut *tx,
                sqlx::raw_sql(&sql),
            )
                .await
                .map_err(|e| MigrateError::ddl(sql.clone(), started.elapsed(), e))?;
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::pool(e, "committing MySQL transaction"))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Server-level handle: connected without a default database.
pub struct MysqlAdmin {
    pool: MySqlPool,
    dialect: MysqlDialect,
}

impl MysqlAdmin {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pool = connect_pool(connect_options(config), 1, "admin").await?;
        info!("Connected to MySQL server: {}:{}", config.host, config.port());
        Ok(Self {
            pool,
            dialect: MysqlDialect::new(),
        })
    }

    async fn run(&self, sql: &str) -> Result<()> {
        let started = Instant::now();
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::ddl(sql, started.elapsed(), e))?;
        Ok(())
    }
}

#[async_trait]
impl AdminHandle for MysqlAdmin {
    async fn has_database(&self, name: &str) -> Result<bool> {
        Ok(self.database_list().await?.iter().any(|d| d == name))
    }

    async fn database_list(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(catalog::DATABASES)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Introspection(format!("listing databases failed: {}", e)))?;
        Ok(common::first_column(&to_records(&rows)))
    }

    async fn create_database_if_not_exists(&self, name: &str) -> Result<()> {
        let sql = format!("CREATE DATABASE IF NOT EXISTS {}", self.dialect.quoting().ident(name)?);
        self.run(&sql).await?;
        info!("Created MySQL database {}", name);
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let sql = format!("DROP DATABASE IF EXISTS {}", self.dialect.quoting().ident(name)?);
        self.run(&sql).await?;
        info!("Dropped MySQL database {}", name);
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
