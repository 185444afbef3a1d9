//! SQLite / libSQL driver.
//!
//! Uses SQLx with a file-backed pool. A batch runs on one connection with
//! foreign key enforcement off so table rebuilds can drop and recreate
//! referenced tables.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Connection, Row, SqliteConnection, ValueRef};
use tracing::{debug, info, warn};

use super::catalog;
use super::rebuild::{self, CurrentTable};
use super::SqliteDialect;
use crate::config::{ConnectionConfig, DbType};
use crate::core::change::{CatalogFacts, DdlPair, Plan, SchemaChange};
use crate::core::schema::{Column, Index, Relation, Trigger, VersionInfo, View};
use crate::core::statement::Statement;
use crate::core::traits::{AdminHandle, Dialect, Driver};
use crate::core::value::Record;
use crate::drivers::common;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait this long on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

fn cell_text(row: &SqliteRow, idx: usize) -> Option<String> {
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
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Some(v.to_string());
    }
    row.try_get::<Vec<u8>, _>(idx)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn to_records(rows: &[SqliteRow]) -> Vec<Record> {
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

fn database_file(config: &ConnectionConfig) -> Result<PathBuf> {
    config
        .filename
        .clone()
        .or_else(|| (!config.database.is_empty()).then(|| PathBuf::from(&config.database)))
        .ok_or_else(|| MigrateError::Config("SQLite connection requires 'filename'".into()))
}

async fn run_in_transaction(
    conn: &mut SqliteConnection,
    dialect: &SqliteDialect,
    statements: &[Statement],
) -> Result<()> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| MigrateError::pool(e, "beginning SQLite transaction"))?;

    for statement in statements {
        let sql = dialect.finalize(statement);
        debug!("Executing on SQLite: {}", sql);
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
        .map_err(|e| MigrateError::pool(e, "committing SQLite transaction"))
}

/// SQLite-family driver bound to one database file.
pub struct SqliteDriver {
    pool: SqlitePool,
    dialect: SqliteDialect,
    db_type: DbType,
}

impl SqliteDriver {
    /// Open (creating if needed) the configured database file.
    pub async fn connect(config: &ConnectionConfig, select_probe: bool) -> Result<Self> {
        let path = database_file(config)?;
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, format!("opening SQLite database {}", path.display())))?;

        let dialect = match config.r#type {
            DbType::Libsql => SqliteDialect::libsql(select_probe),
            _ => SqliteDialect::new(select_probe),
        };
        info!("Opened {} database: {}", dialect.name(), path.display());

        Ok(Self {
            pool,
            dialect,
            db_type: config.r#type,
        })
    }

    async fn fetch(&self, sql: &str, table: Option<&str>, context: &str) -> Result<Vec<Record>> {
        let mut query = sqlx::query(sql);
        if let Some(table) = table {
            query = query.bind(table.to_string());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Introspection(format!("{} failed: {}", context, e)))?;
        Ok(to_records(&rows))
    }

    async fn trigger_sql(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .fetch(catalog::TRIGGERS, Some(table), "loading SQLite triggers")
            .await?;
        Ok(rows.iter().filter_map(|r| r.opt_text("definition")).collect())
    }

    async fn current_table(&self, table: &str) -> Result<CurrentTable> {
        Ok(CurrentTable {
            columns: self.column_list(table).await?,
            indexes: self.index_list(table).await?,
            relations: self.relation_list(table).await?,
            trigger_sql: self.trigger_sql(table).await?,
        })
    }

    /// Columns pinned by an index or a foreign key.
    async fn constrained_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut pinned: Vec<String> = Vec::new();
        for index in self.index_list(table).await? {
            pinned.extend(index.columns.into_iter().map(|c| c.name));
        }
        pinned.extend(self.relation_list(table).await?.into_iter().map(|r| r.column));
        pinned.sort();
        pinned.dedup();
        Ok(pinned)
    }
}

#[async_trait]
impl Driver for SqliteDriver {
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
            .map_err(|e| MigrateError::pool(e, "testing SQLite connection"))?;
        Ok(())
    }

    async fn version(&self) -> Result<VersionInfo> {
        let rows = self.fetch(catalog::VERSION, None, "reading SQLite version").await?;
        let raw = rows.first().map(|r| r.text("version")).unwrap_or_default();
        Ok(VersionInfo::parse(&raw))
    }

    async fn table_list(&self) -> Result<Vec<String>> {
        let sql = match self.db_type {
            DbType::Libsql => catalog::LIBSQL_TABLES,
            _ => catalog::TABLES,
        };
        let rows = self.fetch(sql, None, "listing SQLite tables").await?;
        Ok(common::first_column(&rows))
    }

    async fn column_list(&self, table: &str) -> Result<Vec<Column>> {
        let rows = self
            .fetch(catalog::COLUMNS, Some(table), "loading SQLite columns")
            .await?;
        Ok(catalog::columns_from_records(table, &rows))
    }

    async fn index_list(&self, table: &str) -> Result<Vec<Index>> {
        let rows = self
            .fetch(catalog::INDEXES, Some(table), "loading SQLite indexes")
            .await?;
        Ok(common::indexes_from_records(&rows))
    }

    async fn relation_list(&self, table: &str) -> Result<Vec<Relation>> {
        let rows = self
            .fetch(catalog::RELATIONS, Some(table), "loading SQLite foreign keys")
            .await?;
        common::relations_from_records(&rows)
    }

    async fn trigger_list(&self, table: &str) -> Result<Vec<Trigger>> {
        let rows = self
            .fetch(catalog::TRIGGERS, Some(table), "loading SQLite triggers")
            .await?;
        catalog::triggers_from_records(&rows)
    }

    async fn view_list(&self) -> Result<Vec<View>> {
        let rows = self.fetch(catalog::VIEWS, None, "loading SQLite views").await?;
        common::views_from_records(&rows)
            .into_iter()
            .map(|mut v| {
                v.definition = common::definition_body(&v.definition)?;
                Ok(v)
            })
            .collect()
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
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| MigrateError::pool(e, "acquiring SQLite connection"))?;

        // Both pragmas are no-ops inside a transaction
        sqlx::Executor::execute(
            &mut *conn,
            sqlx::raw_sql("PRAGMA foreign_keys = OFF; PRAGMA legacy_alter_table = ON"),
        )
            .await
            .map_err(|e| MigrateError::pool(e, "preparing SQLite batch"))?;

        let result = run_in_transaction(&mut conn, &self.dialect, statements).await;

        if let Err(e) = sqlx::Executor::execute(
            &mut *conn,
            sqlx::raw_sql("PRAGMA legacy_alter_table = OFF; PRAGMA foreign_keys = ON"),
        )
            .await
        {
            warn!("Failed to restore SQLite pragmas, discarding connection: {}", e);
            conn.detach();
        }
        result
    }

    async fn facts(&self, change: &SchemaChange) -> Result<CatalogFacts> {
        match change {
            SchemaChange::AlterTable { table, .. } => Ok(CatalogFacts {
                constrained_columns: self.constrained_columns(table).await?,
                ..Default::default()
            }),
            SchemaChange::DropTable { table } => Ok(CatalogFacts {
                snapshot: Some(self.snapshot(table).await?),
                ..Default::default()
            }),
            _ => Ok(CatalogFacts::default()),
        }
    }

    async fn expand_plan(&self, change: &SchemaChange, plan: Plan) -> Result<DdlPair> {
        let table = match plan.rebuild_up.as_ref().or(plan.rebuild_down.as_ref()) {
            Some(rebuild) => rebuild.table.clone(),
            None => return Ok(plan.ddl),
        };
        let current = self.current_table(&table).await?;
        rebuild::expand_plan(&self.dialect, change, plan, &current)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// File-level provisioning: a database is a file on disk.
pub struct SqliteAdmin {
    path: PathBuf,
}

impl SqliteAdmin {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self {
            path: database_file(config)?,
        })
    }
}

#[async_trait]
impl AdminHandle for SqliteAdmin {
    async fn has_database(&self, _name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.path).await?)
    }

    async fn database_list(&self) -> Result<Vec<String>> {
        if self.has_database("").await? {
            Ok(vec![self.path.display().to_string()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn create_database_if_not_exists(&self, _name: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);
        let conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| MigrateError::pool(e, format!("creating {}", self.path.display())))?;
        conn.close()
            .await
            .map_err(|e| MigrateError::pool(e, "closing SQLite connection"))?;
        info!("Created SQLite database {}", self.path.display());
        Ok(())
    }

    async fn drop_database(&self, _name: &str) -> Result<()> {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!("Removed SQLite database {}", self.path.display());
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change::TableRebuild;
    use crate::core::schema::Table;
    use tempfile::TempDir;

    async fn driver(dir: &TempDir) -> SqliteDriver {
        let config = ConnectionConfig::sqlite(dir.path().join("test.db"));
        SqliteDriver::connect(&config, false).await.unwrap()
    }

    #[tokio::test]
    async fn test_introspect_roundtrip() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir).await;
        driver
            .execute_batch(&[
                Statement::raw("CREATE TABLE teams (id integer PRIMARY KEY)"),
                Statement::raw(
                    "CREATE TABLE users (id integer PRIMARY KEY, name varchar(50) NOT NULL DEFAULT 'x', \
                     team_id integer REFERENCES teams (id) ON DELETE CASCADE)",
                ),
                Statement::raw("CREATE INDEX idx_users_name ON users (name)"),
            ])
            .await
            .unwrap();

        assert_eq!(driver.table_list().await.unwrap(), vec!["teams", "users"]);
        let schema = driver.introspect("users").await.unwrap();
        assert_eq!(schema.columns.len(), 3);
        assert!(schema.columns[0].auto_increment);
        assert_eq!(schema.columns[1].precision.as_deref(), Some("50"));
        assert!(schema.columns[1].required);
        assert_eq!(schema.indexes[0].name, "idx_users_name");
        assert_eq!(schema.relations[0].parent_table, "teams");

        let facts = driver
            .facts(&SchemaChange::AlterTable {
                table: "users".into(),
                columns: vec![],
                original: vec![],
            })
            .await
            .unwrap();
        assert_eq!(facts.constrained_columns, vec!["name", "team_id"]);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir).await;
        let err = driver
            .execute_batch(&[
                Statement::raw("CREATE TABLE a (id integer)"),
                Statement::raw("CREATE TABLE a (id integer)"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::DdlExecution { .. }));
        assert!(!driver.has_table("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_preserves_rows() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir).await;
        let d = driver.dialect();
        let table = Table::new(
            "users",
            vec![
                Column::new("id", "integer").primary_key().auto_increment(),
                Column::new("name", "varchar").with_precision("50"),
            ],
        );
        let create = crate::ddl::table::create_table(d, &table, &[]).unwrap();
        driver.execute_batch(&create.up).await.unwrap();
        driver
            .execute_batch(&[
                Statement::raw("CREATE INDEX idx_name ON users (name)"),
                Statement::raw("INSERT INTO users (name) VALUES ('ada'), ('grace')"),
            ])
            .await
            .unwrap();

        let mut rebuild = TableRebuild::new("users");
        rebuild.columns = Some(vec![
            Column::new("id", "integer").primary_key().auto_increment(),
            Column::new("label", "varchar").with_precision("100"),
        ]);
        rebuild.renames.push(("label".into(), "name".into()));
        let current = driver.current_table("users").await.unwrap();
        let statements = rebuild::expand(&driver.dialect, &rebuild, &current).unwrap();
        driver.execute_batch(&statements).await.unwrap();

        let rows = driver.query("SELECT label FROM users ORDER BY id").await.unwrap();
        let labels: Vec<String> = rows.iter().map(|r| r.text("label")).collect();
        assert_eq!(labels, vec!["ada", "grace"]);
        let indexes = driver.index_list("users").await.unwrap();
        assert_eq!(indexes[0].column_names(), vec!["label"]);
        assert_eq!(driver.table_list().await.unwrap(), vec!["users"]);
    }

    #[tokio::test]
    async fn test_admin_create_and_drop() {
        let dir = TempDir::new().unwrap();
        let config = ConnectionConfig::sqlite(dir.path().join("nested/app.db"));
        let admin = SqliteAdmin::new(&config).unwrap();
        assert!(!admin.has_database("app").await.unwrap());
        admin.create_database_if_not_exists("app").await.unwrap();
        assert!(admin.has_database("app").await.unwrap());
        admin.drop_database("app").await.unwrap();
        assert!(admin.database_list().await.unwrap().is_empty());
    }
}
