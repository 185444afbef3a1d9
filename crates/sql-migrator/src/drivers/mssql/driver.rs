//! SQL Server driver.
//!
//! Uses Tiberius with bb8 connection pooling. Catalog rows are decoded to text
//! and handed to the parsers in [`super::catalog`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use super::catalog;
use super::MssqlDialect;
use crate::config::{ConnectionConfig, DbType};
use crate::core::schema::{
    Column, Index, Relation, Routine, RoutineKind, Sequence, Trigger, VersionInfo, View,
};
use crate::core::statement::Statement;
use crate::core::traits::{AdminHandle, Dialect, Driver};
use crate::core::value::Record;
use crate::drivers::common;
use crate::error::{MigrateError, Result};

/// Maximum TDS packet size (32767 bytes, ~32KB).
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection acquisition timeout from pool (30 seconds).
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connection timeout (5 minutes).
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum connection lifetime (30 minutes).
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// TCP keepalive interval (30 seconds).
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: ConnectionConfig,
    database: String,
}

impl TiberiusConnectionManager {
    fn new(config: ConnectionConfig, database: impl Into<String>) -> Self {
        Self {
            config,
            database: database.into(),
        }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port());
        config.database(&self.database);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));

        // Encryption settings
        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

fn io_error(e: std::io::Error, context: &str) -> tiberius::error::Error {
    tiberius::error::Error::Io {
        kind: e.kind(),
        message: format!("{}: {}", context, e),
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| io_error(e, "Failed to connect"))?;
        tcp.set_nodelay(true).ok();

        // Enable TCP keepalives
        let std_tcp = tcp
            .into_std()
            .map_err(|e| io_error(e, "Failed to detach socket"))?;
        let socket = socket2::Socket::from(std_tcp);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
        }
        let std_tcp: std::net::TcpStream = socket.into();
        std_tcp.set_nonblocking(true).ok();
        let tcp = TcpStream::from_std(std_tcp).map_err(|e| io_error(e, "Failed to convert socket"))?;

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

async fn build_pool(
    config: &ConnectionConfig,
    database: &str,
    max_size: u32,
) -> Result<Pool<TiberiusConnectionManager>> {
    let manager = TiberiusConnectionManager::new(config.clone(), database);
    let pool = Pool::builder()
        .max_size(max_size)
        .min_idle(Some(1))
        .connection_timeout(POOL_CONNECTION_TIMEOUT)
        .idle_timeout(Some(POOL_IDLE_TIMEOUT))
        .max_lifetime(Some(POOL_MAX_LIFETIME))
        .test_on_check_out(true)
        .build(manager)
        .await
        .map_err(|e| MigrateError::pool(e, "creating MSSQL connection pool"))?;

    // Test connection
    {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing MSSQL connection"))?;
        conn.simple_query("SELECT 1").await?.into_row().await?;
    }
    Ok(pool)
}

/// Decode one cell as text.
fn cell_text(row: &Row, idx: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<&str, _>(idx) {
        return v.map(str::to_string);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<i16, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<u8, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return v.map(|b| if b { "1" } else { "0" }.to_string());
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<f32, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<tiberius::numeric::Numeric, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return v.map(|d| d.to_string());
    }
    if let Ok(v) = row.try_get::<tiberius::Uuid, _>(idx) {
        return v.map(|u| u.to_string());
    }
    row.try_get::<&[u8], _>(idx)
        .ok()
        .flatten()
        .map(|b| String::from_utf8_lossy(b).into_owned())
}

fn to_records(rows: &[Row]) -> Vec<Record> {
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

type MssqlClient = Client<Compat<TcpStream>>;

async fn run_statements(
    conn: &mut MssqlClient,
    dialect: &MssqlDialect,
    statements: &[Statement],
) -> Result<()> {
    for statement in statements {
        let sql = dialect.finalize(statement);
        debug!("Executing on MSSQL: {}", sql);
        let started = Instant::now();
        conn.execute(sql.as_str(), &[])
            .await
            .map_err(|e| MigrateError::ddl(sql.clone(), started.elapsed(), e))?;
    }
    Ok(())
}

/// SQL Server driver bound to one database and schema.
pub struct MssqlDriver {
    pool: Pool<TiberiusConnectionManager>,
    dialect: MssqlDialect,
    schema: String,
}

impl MssqlDriver {
    /// Connect to the configured database.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pool = build_pool(config, &config.database, config.max_connections).await?;
        let dialect = MssqlDialect::new(config.schema.as_deref());
        let schema = dialect.schema().unwrap_or_default().to_string();

        info!(
            "Connected to MSSQL: {}:{}/{} (schema={}, pool_size={})",
            config.host,
            config.port(),
            config.database,
            schema,
            config.max_connections
        );

        Ok(Self {
            pool,
            dialect,
            schema,
        })
    }

    /// Get a pooled connection.
    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting MSSQL connection from pool"))
    }

    /// Run a catalog query; `@P1` is the schema and `table` binds `@P2`.
    async fn fetch(&self, sql: &str, table: Option<&str>, context: &str) -> Result<Vec<Record>> {
        let mut client = self.get_client().await?;
        let schema = self.schema.as_str();
        let mut params: Vec<&dyn ToSql> = vec![&schema];
        if let Some(table) = &table {
            params.push(table);
        }
        let stream = client
            .query(sql, &params)
            .await
            .map_err(|e| MigrateError::Introspection(format!("{} failed: {}", context, e)))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| MigrateError::Introspection(format!("{} failed: {}", context, e)))?;
        Ok(to_records(&rows))
    }

    async fn routines(&self, sql: &str, kind: RoutineKind) -> Result<Vec<Routine>> {
        let rows = self.fetch(sql, None, "loading MSSQL routines").await?;
        let mut routines = common::routines_from_records(&rows, kind);
        for routine in &mut routines {
            routine.schema = Some(self.schema.clone());
        }
        Ok(routines)
    }
}

#[async_trait]
impl Driver for MssqlDriver {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> DbType {
        DbType::Mssql
    }

    async fn test_connection(&self) -> Result<()> {
        let mut client = self.get_client().await?;
        client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    async fn version(&self) -> Result<VersionInfo> {
        let mut client = self.get_client().await?;
        let rows = client
            .simple_query(catalog::VERSION)
            .await?
            .into_first_result()
            .await?;
        let raw = to_records(&rows)
            .first()
            .map(|r| r.text("version"))
            .unwrap_or_default();
        Ok(VersionInfo::parse(&raw))
    }

    async fn table_list(&self) -> Result<Vec<String>> {
        let rows = self.fetch(catalog::TABLES, None, "listing MSSQL tables").await?;
        Ok(common::first_column(&rows))
    }

    async fn schema_list(&self) -> Result<Vec<String>> {
        let mut client = self.get_client().await?;
        let rows = client
            .simple_query(catalog::SCHEMAS)
            .await?
            .into_first_result()
            .await?;
        Ok(common::first_column(&to_records(&rows)))
    }

    async fn column_list(&self, table: &str) -> Result<Vec<Column>> {
        let rows = self
            .fetch(catalog::COLUMNS, Some(table), "loading MSSQL columns")
            .await?;
        Ok(catalog::columns_from_records(table, &rows))
    }

    async fn index_list(&self, table: &str) -> Result<Vec<Index>> {
        let rows = self
            .fetch(catalog::INDEXES, Some(table), "loading MSSQL indexes")
            .await?;
        Ok(common::indexes_from_records(&rows))
    }

    async fn relation_list(&self, table: &str) -> Result<Vec<Relation>> {
        let rows = self
            .fetch(&catalog::relations_query(), Some(table), "loading MSSQL foreign keys")
            .await?;
        common::relations_from_records(&rows)
    }

    async fn relation_list_all(&self) -> Result<Vec<Relation>> {
        let rows = self
            .fetch(&catalog::all_relations_query(), None, "loading MSSQL foreign keys")
            .await?;
        common::relations_from_records(&rows)
    }

    async fn trigger_list(&self, table: &str) -> Result<Vec<Trigger>> {
        let rows = self
            .fetch(catalog::TRIGGERS, Some(table), "loading MSSQL triggers")
            .await?;
        let mut triggers = common::triggers_from_records(&rows)?;
        for trigger in &mut triggers {
            trigger.schema = Some(self.schema.clone());
            trigger.statement = catalog::trigger_body(&trigger.statement)?;
        }
        Ok(triggers)
    }

    async fn view_list(&self) -> Result<Vec<View>> {
        let rows = self.fetch(catalog::VIEWS, None, "loading MSSQL views").await?;
        let mut views = common::views_from_records(&rows);
        for view in &mut views {
            view.schema = Some(self.schema.clone());
            view.definition = common::definition_body(&view.definition)?;
        }
        Ok(views)
    }

    async fn function_list(&self) -> Result<Vec<Routine>> {
        self.routines(catalog::FUNCTIONS, RoutineKind::Function).await
    }

    async fn procedure_list(&self) -> Result<Vec<Routine>> {
        self.routines(catalog::PROCEDURES, RoutineKind::Procedure).await
    }

    async fn sequence_list(&self) -> Result<Vec<Sequence>> {
        let rows = self
            .fetch(catalog::SEQUENCES, None, "loading MSSQL sequences")
            .await?;
        let mut sequences = common::sequences_from_records(&rows);
        for sequence in &mut sequences {
            sequence.schema = Some(self.schema.clone());
        }
        Ok(sequences)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>> {
        let mut client = self.get_client().await?;
        let rows = client
            .simple_query(sql)
            .await
            .map_err(|e| MigrateError::Introspection(format!("query failed: {}", e)))?
            .into_first_result()
            .await
            .map_err(|e| MigrateError::Introspection(format!("query failed: {}", e)))?;
        Ok(to_records(&rows))
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        let mut client = self.get_client().await?;
        client
            .simple_query("SET XACT_ABORT ON; BEGIN TRANSACTION")
            .await?
            .into_results()
            .await?;

        match run_statements(&mut client, &self.dialect, statements).await {
            Ok(()) => {
                client
                    .simple_query("COMMIT TRANSACTION")
                    .await?
                    .into_results()
                    .await?;
                Ok(())
            }
            Err(e) => {
                let rollback = client
                    .simple_query("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
                    .await;
                match rollback {
                    Ok(stream) => {
                        if let Err(re) = stream.into_results().await {
                            warn!("MSSQL rollback failed: {}", re);
                        }
                    }
                    Err(re) => warn!("MSSQL rollback failed: {}", re),
                }
                Err(e)
            }
        }
    }

    async fn pk_constraint(&self, table: &str) -> Result<Option<String>> {
        let rows = self
            .fetch(catalog::PK_CONSTRAINT, Some(table), "reading MSSQL primary key name")
            .await?;
        Ok(rows.first().and_then(|r| r.opt_text("name")))
    }

    async fn close(&self) {
        // bb8 pools close when dropped
    }
}

/// Server-level handle connected to `master`.
pub struct MssqlAdmin {
    pool: Pool<TiberiusConnectionManager>,
    dialect: MssqlDialect,
}

impl MssqlAdmin {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pool = build_pool(config, "master", 1).await?;
        info!("Connected to MSSQL server: {}:{}", config.host, config.port());
        Ok(Self {
            pool,
            dialect: MssqlDialect::default(),
        })
    }

    async fn run(&self, sql: &str) -> Result<()> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting MSSQL admin connection"))?;
        let started = Instant::now();
        client
            .simple_query(sql)
            .await
            .map_err(|e| MigrateError::ddl(sql, started.elapsed(), e))?
            .into_results()
            .await
            .map_err(|e| MigrateError::ddl(sql, started.elapsed(), e))?;
        Ok(())
    }
}

#[async_trait]
impl AdminHandle for MssqlAdmin {
    async fn has_database(&self, name: &str) -> Result<bool> {
        Ok(self.database_list().await?.iter().any(|d| d.eq_ignore_ascii_case(name)))
    }

    async fn database_list(&self) -> Result<Vec<String>> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting MSSQL admin connection"))?;
        let rows = client
            .simple_query(catalog::DATABASES)
            .await?
            .into_first_result()
            .await?;
        Ok(common::first_column(&to_records(&rows)))
    }

    async fn create_database_if_not_exists(&self, name: &str) -> Result<()> {
        let quoted = self.dialect.quoting().ident(name)?;
        let literal = self.dialect.quoting().value(name);
        self.run(&format!("IF DB_ID({}) IS NULL CREATE DATABASE {}", literal, quoted))
            .await?;
        info!("Created MSSQL database {}", name);
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let quoted = self.dialect.quoting().ident(name)?;
        self.run(&format!("DROP DATABASE IF EXISTS {}", quoted)).await?;
        info!("Dropped MSSQL database {}", name);
        Ok(())
    }

    async fn close(&self) {}
}
