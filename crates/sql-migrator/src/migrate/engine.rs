//! Migration engine.
//!
//! Ties the unit store, the applied ledger and the alias registry together.
//! Every mutating operation on an alias holds the write half of that alias'
//! lock for its whole duration. Introspection, planning and listing hold the
//! read half, so they never observe a half-applied batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::StoreKind;
use crate::core::change::{DdlPair, SchemaChange};
use crate::core::registry::AliasRegistry;
use crate::core::schema::TableSchema;
use crate::core::statement::Statement;
use crate::core::traits::{bounded, Driver};
use crate::error::{MigrateError, OrderError, Result};
use crate::telemetry::{self, EventSink, NoopSink};

use super::ledger::{next_batch, AppliedMigration, EvolutionLedger};
use super::order::{select_down, select_up, MigrateOutcome, MigrateTarget, Selection};
use super::store::{DbLedgerStore, FsLedgerStore, LedgerStore};
use super::title::{self, TitleGenerator};
use super::unit::{MigrationUnit, UnitState};

/// Outcome of provisioning an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitOutcome {
    pub alias: String,
    pub database: String,
    pub database_created: bool,
    pub ledger_created: bool,
}

/// Connectivity of one alias.
#[derive(Debug, Clone, Serialize)]
pub struct AliasHealth {
    pub alias: String,
    pub db_type: String,
    pub connected: bool,
    pub latency_ms: u64,
    pub version: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub aliases: Vec<AliasHealth>,
    pub healthy: bool,
}

/// Reversible migrations for every configured alias.
pub struct MigrationEngine {
    registry: Arc<AliasRegistry>,
    store: Arc<dyn LedgerStore>,
    ledger: EvolutionLedger,
    titles: TitleGenerator,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
    telemetry: Arc<dyn EventSink>,
}

impl MigrationEngine {
    pub fn new(registry: Arc<AliasRegistry>, store: Arc<dyn LedgerStore>) -> Self {
        let ledger = EvolutionLedger::new(registry.config().migrations.evolutions_table.clone());
        Self {
            registry,
            store,
            ledger,
            titles: TitleGenerator::new(),
            locks: Mutex::new(HashMap::new()),
            telemetry: Arc::new(NoopSink),
        }
    }

    /// Engine with the unit store the configuration names.
    pub async fn from_registry(registry: Arc<AliasRegistry>) -> Result<Self> {
        let migrations = &registry.config().migrations;
        let store: Arc<dyn LedgerStore> = match migrations.store {
            StoreKind::Files => Arc::new(FsLedgerStore::new(migrations.dir.clone())),
            StoreKind::Database => {
                let meta = migrations.meta_alias.clone().ok_or_else(|| {
                    MigrateError::Config("migrations.meta_alias is required".into())
                })?;
                let table = migrations.units_table.clone();
                let driver = registry.driver(&meta).await?;
                let limit = registry.timeout(&meta);
                Arc::new(bounded(limit, DbLedgerStore::open(driver, table)).await?)
            }
        };
        info!("Using {} unit store", store.kind());
        Ok(Self::new(registry, store))
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.telemetry = sink;
        self
    }

    pub fn registry(&self) -> &Arc<AliasRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn ledger(&self) -> &EvolutionLedger {
        &self.ledger
    }

    /// Close every open driver.
    pub async fn close(&self) {
        self.registry.close_all().await;
    }

    async fn alias_lock(&self, alias: &str) -> Arc<RwLock<()>> {
        self.locks
            .lock()
            .await
            .entry(alias.to_string())
            .or_default()
            .clone()
    }

    fn limit(&self, alias: &str) -> Option<Duration> {
        self.registry.timeout(alias)
    }

    async fn driver(&self, alias: &str) -> Result<Arc<dyn Driver>> {
        bounded(self.limit(alias), self.registry.driver(alias)).await
    }

    fn emit(&self, event: &str, payload: serde_json::Value) {
        telemetry::emit(self.telemetry.as_ref(), event, payload);
    }

    // =========================================================================
    // Introspection and planning
    // =========================================================================

    /// Columns, indexes and foreign keys of `table` on `alias`.
    pub async fn introspect(&self, alias: &str, table: &str) -> Result<TableSchema> {
        debug!("Introspecting {}.{}", alias, table);
        let lock = self.alias_lock(alias).await;
        let _guard = lock.read().await;
        let driver = self.driver(alias).await?;
        bounded(self.limit(alias), driver.introspect(table)).await
    }

    /// Forward and reverse DDL for `change`, with any table rebuild expanded.
    pub async fn plan_change(&self, alias: &str, change: &SchemaChange) -> Result<DdlPair> {
        let lock = self.alias_lock(alias).await;
        let _guard = lock.read().await;
        self.plan_locked(alias, change).await
    }

    async fn plan_locked(&self, alias: &str, change: &SchemaChange) -> Result<DdlPair> {
        let driver = self.driver(alias).await?;
        let limit = self.limit(alias);
        let plan = bounded(limit, driver.plan(change)).await?;
        let ddl = bounded(limit, driver.expand_plan(change, plan)).await?;
        debug!(
            "Planned {} on '{}': {} up, {} down statements",
            change.operation(),
            alias,
            ddl.up.len(),
            ddl.down.len()
        );
        Ok(ddl)
    }

    /// Store `ddl` as a new written unit.
    pub async fn record_change(&self, alias: &str, ddl: &DdlPair) -> Result<MigrationUnit> {
        self.registry.connection(alias)?;
        let mut unit = MigrationUnit::new(alias, &self.titles.next());
        unit.write(&ddl.up, &ddl.down);
        self.store.insert(&unit).await?;
        info!("Recorded migration {} for '{}'", unit.title, alias);
        Ok(unit)
    }

    /// Plan `change`, record it and apply it together with anything pending
    /// before it.
    pub async fn apply_structural_change(
        &self,
        alias: &str,
        change: &SchemaChange,
    ) -> Result<DdlPair> {
        let lock = self.alias_lock(alias).await;
        let _guard = lock.write().await;
        info!("Applying {} on '{}'", change.operation(), alias);

        let ddl = match self.plan_locked(alias, change).await {
            Ok(ddl) => ddl,
            Err(e) => {
                error!("Planning {} on '{}' failed: {}", change.operation(), alias, e);
                return Err(e);
            }
        };
        if ddl.up.is_empty() {
            info!("{} on '{}' produced no statements", change.operation(), alias);
            return Ok(ddl);
        }

        let unit = self.record_change(alias, &ddl).await?;
        let target = MigrateTarget::Until(unit.title.clone());
        if let Err(e) = self.up_locked(alias, &target).await {
            if let Err(cleanup) = self.store.delete(alias, &unit.title).await {
                warn!("Failed to discard migration {}: {}", unit.title, cleanup);
            }
            return Err(e);
        }

        self.emit(
            telemetry::SCHEMA_CHANGE,
            json!({
                "alias": alias,
                "operation": change.operation(),
                "table": change.table(),
                "title": unit.title,
            }),
        );
        Ok(ddl)
    }

    // =========================================================================
    // Unit lifecycle
    // =========================================================================

    /// New unit with empty text.
    pub async fn migrations_create(&self, alias: &str) -> Result<MigrationUnit> {
        self.registry.connection(alias)?;
        let unit = MigrationUnit::new(alias, &self.titles.next());
        self.store.insert(&unit).await?;
        info!("Created migration {} for '{}'", unit.title, alias);
        Ok(unit)
    }

    /// Replace a unit's text. Applied units cannot be rewritten.
    pub async fn migrations_write(
        &self,
        alias: &str,
        title: &str,
        up: &[Statement],
        down: &[Statement],
    ) -> Result<MigrationUnit> {
        let title = title::normalize(title)?;
        let lock = self.alias_lock(alias).await;
        let _guard = lock.write().await;

        let applied = self.applied(alias).await?;
        if applied.iter().any(|a| a.title == title) {
            return Err(OrderError::Applied(title).into());
        }

        let mut unit = match self.store.get(alias, &title).await? {
            Some(unit) => unit,
            None => MigrationUnit::new(alias, title::stem_of(&title)),
        };
        unit.write(up, down);
        self.store.insert(&unit).await?;
        info!("Wrote migration {} for '{}'", unit.title, alias);
        Ok(unit)
    }

    /// Forward and reverse text of one unit.
    pub async fn migrations_to_sql(&self, alias: &str, title: &str) -> Result<(String, String)> {
        let title = title::normalize(title)?;
        let unit = self
            .store
            .get(alias, &title)
            .await?
            .ok_or_else(|| OrderError::NotFound(title.clone()))?;
        Ok((unit.up, unit.down))
    }

    /// Every unit with its applied flag.
    pub async fn migrations_list(&self, alias: &str) -> Result<MigrateOutcome> {
        self.migrate(alias, MigrateTarget::ListOnly).await
    }

    /// Apply pending units, or only list them for `ListOnly`.
    pub async fn migrate(&self, alias: &str, target: MigrateTarget) -> Result<MigrateOutcome> {
        match target {
            MigrateTarget::ListOnly => {
                let lock = self.alias_lock(alias).await;
                let _guard = lock.read().await;
                let units = self.store.list(alias).await?;
                let applied = self.applied(alias).await?;
                Ok(select_up(&units, &applied, &MigrateTarget::ListOnly)?.outcome)
            }
            target => self.migrations_up(alias, target).await,
        }
    }

    pub async fn migrations_up(&self, alias: &str, target: MigrateTarget) -> Result<MigrateOutcome> {
        let target = target.normalized()?;
        let lock = self.alias_lock(alias).await;
        let _guard = lock.write().await;
        self.up_locked(alias, &target).await
    }

    pub async fn migrations_down(
        &self,
        alias: &str,
        target: MigrateTarget,
    ) -> Result<MigrateOutcome> {
        let target = target.normalized()?;
        let lock = self.alias_lock(alias).await;
        let _guard = lock.write().await;
        self.down_locked(alias, &target).await
    }

    /// Remove a unit, reverting it first when it is the latest applied one.
    pub async fn migrations_delete(&self, alias: &str, title: &str) -> Result<MigrateOutcome> {
        let title = title::normalize(title)?;
        let lock = self.alias_lock(alias).await;
        let _guard = lock.write().await;

        if self.store.get(alias, &title).await?.is_none() {
            return Err(OrderError::NotFound(title).into());
        }

        let applied = self.applied(alias).await?;
        let outcome = match applied.iter().position(|a| a.title == title) {
            None => MigrateOutcome::default(),
            Some(i) if i + 1 == applied.len() => {
                self.down_locked(alias, &MigrateTarget::Steps(1)).await?
            }
            Some(_) => return Err(OrderError::Applied(title).into()),
        };

        self.store.delete(alias, &title).await?;
        info!("Deleted migration {} for '{}'", title, alias);
        Ok(outcome)
    }

    async fn applied(&self, alias: &str) -> Result<Vec<AppliedMigration>> {
        let driver = self.driver(alias).await?;
        bounded(self.limit(alias), self.ledger.list(driver.as_ref())).await
    }

    async fn up_locked(&self, alias: &str, target: &MigrateTarget) -> Result<MigrateOutcome> {
        let driver = self.driver(alias).await?;
        let limit = self.limit(alias);

        let units = self.store.list(alias).await?;
        let applied = bounded(limit, self.ledger.list(driver.as_ref())).await?;
        let Selection { indexes, outcome } = select_up(&units, &applied, target)?;
        if indexes.is_empty() {
            info!("No pending migrations to apply on '{}'", alias);
            return Ok(outcome);
        }

        bounded(limit, self.ledger.ensure(driver.as_ref())).await?;
        let dialect = driver.dialect();
        let batch = next_batch(&applied);

        let mut statements = Vec::new();
        for &i in &indexes {
            statements.extend(units[i].up_statements()?);
        }
        for &i in &indexes {
            statements.push(self.ledger.insert(dialect, &units[i], batch)?);
        }

        let started = Instant::now();
        info!(
            "Applying {} migration(s) on '{}' as batch {}",
            indexes.len(),
            alias,
            batch
        );
        if let Err(e) = bounded(limit, driver.execute_batch(&statements)).await {
            error!("Migration up on '{}' rolled back: {}", alias, e);
            return Err(e);
        }
        info!(
            "Applied {} migration(s) on '{}' in {:?}",
            indexes.len(),
            alias,
            started.elapsed()
        );

        for &i in &indexes {
            let mut unit = units[i].clone();
            unit.state = UnitState::Applied;
            unit.batch = Some(batch);
            self.mark(&unit).await;
        }
        self.emit(
            telemetry::MIGRATION_UP,
            json!({
                "alias": alias,
                "batch": batch,
                "titles": outcome.applied_titles,
            }),
        );
        Ok(outcome)
    }

    async fn down_locked(&self, alias: &str, target: &MigrateTarget) -> Result<MigrateOutcome> {
        let driver = self.driver(alias).await?;
        let limit = self.limit(alias);

        let units = self.store.list(alias).await?;
        let applied = bounded(limit, self.ledger.list(driver.as_ref())).await?;
        let Selection { indexes, outcome } = select_down(&units, &applied, target)?;
        if indexes.is_empty() {
            info!("No applied migrations to revert on '{}'", alias);
            return Ok(outcome);
        }

        let dialect = driver.dialect();
        let mut statements = Vec::new();
        for &i in &indexes {
            statements.extend(units[i].down_statements()?);
        }
        for &i in &indexes {
            statements.push(self.ledger.delete(dialect, &units[i].title)?);
        }

        info!("Reverting {} migration(s) on '{}'", indexes.len(), alias);
        if let Err(e) = bounded(limit, driver.execute_batch(&statements)).await {
            error!("Migration down on '{}' rolled back: {}", alias, e);
            return Err(e);
        }

        for &i in &indexes {
            let mut unit = units[i].clone();
            unit.state = UnitState::Reverted;
            unit.batch = None;
            self.mark(&unit).await;
        }
        self.emit(
            telemetry::MIGRATION_DOWN,
            json!({
                "alias": alias,
                "titles": outcome.applied_titles,
            }),
        );
        Ok(outcome)
    }

    /// Record a unit's new state in stores that keep one. The applied ledger
    /// is authoritative, so a failure here only warns.
    async fn mark(&self, unit: &MigrationUnit) {
        if !self.store.tracks_state() {
            return;
        }
        if let Err(e) = self.store.insert(unit).await {
            warn!("Failed to mark {} as {}: {}", unit.title, unit.state, e);
        }
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    /// Create the alias' database if missing, then its applied ledger.
    pub async fn init_alias(&self, alias: &str) -> Result<InitOutcome> {
        let database = self.registry.connection(alias)?.database_name();
        let limit = self.limit(alias);

        let admin = bounded(limit, self.registry.admin(alias)).await?;
        let created = async {
            if bounded(limit, admin.has_database(&database)).await? {
                return Ok(false);
            }
            bounded(limit, admin.create_database_if_not_exists(&database)).await?;
            Ok::<bool, MigrateError>(true)
        }
        .await;
        admin.close().await;
        let database_created = created?;
        if database_created {
            info!("Created database '{}' for '{}'", database, alias);
        }

        let driver = self.driver(alias).await?;
        let ledger_created = bounded(limit, self.ledger.ensure(driver.as_ref())).await?;
        Ok(InitOutcome {
            alias: alias.to_string(),
            database,
            database_created,
            ledger_created,
        })
    }

    /// Drop the alias' database.
    pub async fn clean_alias(&self, alias: &str) -> Result<()> {
        let database = self.registry.connection(alias)?.database_name();
        let limit = self.limit(alias);
        let lock = self.alias_lock(alias).await;
        let _guard = lock.write().await;

        self.registry.release(alias).await;
        let admin = bounded(limit, self.registry.admin(alias)).await?;
        let result = bounded(limit, admin.drop_database(&database)).await;
        admin.close().await;
        result?;
        warn!("Dropped database '{}' of '{}'", database, alias);
        Ok(())
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Connect to every alias concurrently and report its version.
    pub async fn health_check(&self) -> HealthCheckResult {
        let aliases = join_all(
            self.registry
                .aliases()
                .into_iter()
                .map(|alias| self.probe(alias)),
        )
        .await;
        let healthy = aliases.iter().all(|a| a.connected);
        HealthCheckResult { aliases, healthy }
    }

    async fn probe(&self, alias: String) -> AliasHealth {
        let db_type = self
            .registry
            .connection(&alias)
            .map(|c| c.r#type.to_string())
            .unwrap_or_default();
        let limit = self.limit(&alias);
        let started = Instant::now();
        let probe = async {
            let driver = self.driver(&alias).await?;
            bounded(limit, driver.test_connection()).await?;
            bounded(limit, driver.version()).await
        }
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match probe {
            Ok(version) => AliasHealth {
                alias,
                db_type,
                connected: true,
                latency_ms,
                version: Some(version.version),
                error: None,
            },
            Err(e) => {
                warn!("Health check failed for '{}': {}", alias, e);
                AliasHealth {
                    alias,
                    db_type,
                    connected: false,
                    latency_ms,
                    version: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::{Config, ConnectionConfig};
    use crate::core::catalog::DriverCatalog;
    use crate::core::schema::{Column, Index, Table};
    use crate::telemetry::ChannelSink;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> Arc<AliasRegistry> {
        let mut config = Config::default();
        config.migrations.dir = dir.path().join("migrations");
        config
            .connections
            .insert("main".into(), ConnectionConfig::sqlite(dir.path().join("main.db")));
        Arc::new(AliasRegistry::new(
            Arc::new(config),
            Arc::new(DriverCatalog::with_builtins()),
        ))
    }

    async fn engine(dir: &TempDir) -> MigrationEngine {
        MigrationEngine::from_registry(registry(dir)).await.unwrap()
    }

    fn create_t() -> SchemaChange {
        SchemaChange::CreateTable {
            table: Table::new(
                "t",
                vec![
                    Column::new("id", "int").primary_key().auto_increment(),
                    Column::new("name", "varchar").with_precision("50"),
                ],
            ),
        }
    }

    async fn texts(engine: &MigrationEngine, sql: &str, column: &str) -> Vec<String> {
        let driver = engine.driver("main").await.unwrap();
        let rows = driver.query(sql).await.unwrap();
        rows.iter().map(|r| r.text(column)).collect()
    }

    /// Table `p(id, name, note)` with `name` indexed and two rows.
    async fn seeded_p(engine: &MigrationEngine) -> Vec<Column> {
        let table = Table::new(
            "p",
            vec![
                Column::new("id", "integer").primary_key().auto_increment(),
                Column::new("name", "varchar").with_precision("50"),
                Column::new("note", "text"),
            ],
        );
        engine
            .apply_structural_change("main", &SchemaChange::CreateTable { table })
            .await
            .unwrap();
        let index = Index::new("idx_p_name", "p", &["name"], false);
        engine
            .apply_structural_change("main", &SchemaChange::CreateIndex { index })
            .await
            .unwrap();
        engine
            .driver("main")
            .await
            .unwrap()
            .execute_batch(&[Statement::raw(
                "INSERT INTO p (name, note) VALUES ('ada', 'first'), ('grace', 'second')",
            )])
            .await
            .unwrap();
        engine.introspect("main", "p").await.unwrap().columns
    }

    async fn alter(engine: &MigrationEngine, table: &str, columns: Vec<Column>, original: Vec<Column>) {
        engine
            .apply_structural_change(
                "main",
                &SchemaChange::AlterTable {
                    table: table.into(),
                    columns,
                    original,
                },
            )
            .await
            .unwrap();
    }

    async fn ledger_titles(engine: &MigrationEngine) -> Vec<String> {
        engine
            .applied("main")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect()
    }

    // =========================================================================
    // Structural changes
    // =========================================================================

    #[tokio::test]
    async fn test_create_table_apply_and_revert() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let ddl = engine.apply_structural_change("main", &create_t()).await.unwrap();
        assert!(ddl.up[0].sql().starts_with("CREATE TABLE \"t\""));
        assert_eq!(ddl.down.last().unwrap().sql(), "DROP TABLE \"t\"");

        let schema = engine.introspect("main", "t").await.unwrap();
        assert_eq!(schema.columns.len(), 2);
        let id = &schema.columns[0];
        assert!(id.primary_key && id.auto_increment && id.required);
        let name = &schema.columns[1];
        assert_eq!(name.name, "name");
        assert_eq!(name.precision.as_deref(), Some("50"));
        assert!(!name.required && !name.primary_key);

        let listing = engine.migrations_list("main").await.unwrap();
        assert_eq!(listing.pending, 0);
        assert_eq!(listing.listing.len(), 1);
        assert!(listing.listing[0].applied);

        let down = engine
            .migrations_down("main", MigrateTarget::Steps(1))
            .await
            .unwrap();
        assert_eq!(down.applied_titles, vec![listing.listing[0].title.clone()]);
        let err = engine.introspect("main", "t").await.unwrap_err();
        assert!(matches!(err, MigrateError::TableNotFound(_)));
        assert!(ledger_titles(&engine).await.is_empty());

        // and forward again from the stored unit
        let up = engine
            .migrations_up("main", MigrateTarget::Steps(1))
            .await
            .unwrap();
        assert_eq!(up.pending, 1);
        assert_eq!(engine.introspect("main", "t").await.unwrap().columns.len(), 2);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_rename_and_retype_preserves_values() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let table = Table::new(
            "p",
            vec![
                Column::new("id", "integer").primary_key().auto_increment(),
                Column::new("qty", "varchar").with_precision("10"),
            ],
        );
        engine
            .apply_structural_change("main", &SchemaChange::CreateTable { table })
            .await
            .unwrap();
        let driver = engine.driver("main").await.unwrap();
        driver
            .execute_batch(&[Statement::raw("INSERT INTO p (qty) VALUES ('5'), ('7')")])
            .await
            .unwrap();

        let original = engine.introspect("main", "p").await.unwrap().columns;
        let mut columns = original.clone();
        let mut amount = Column::new("qty", "integer").renamed("amount");
        amount.table_name = "p".into();
        amount.ordinal = columns[1].ordinal;
        columns[1] = amount;
        engine
            .apply_structural_change(
                "main",
                &SchemaChange::AlterTable {
                    table: "p".into(),
                    columns,
                    original,
                },
            )
            .await
            .unwrap();

        let rows = driver.query("SELECT amount FROM p ORDER BY id").await.unwrap();
        let values: Vec<String> = rows.iter().map(|r| r.text("amount")).collect();
        assert_eq!(values, vec!["5", "7"]);

        engine
            .migrations_down("main", MigrateTarget::Steps(1))
            .await
            .unwrap();
        let rows = driver.query("SELECT qty FROM p ORDER BY id").await.unwrap();
        let values: Vec<String> = rows.iter().map(|r| r.text("qty")).collect();
        assert_eq!(values, vec!["5", "7"]);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_indexed_column_rename_reverts_with_values() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let original = seeded_p(&engine).await;

        let mut columns = original.clone();
        columns[1] = columns[1].clone().renamed("label");
        alter(&engine, "p", columns, original).await;

        assert_eq!(
            texts(&engine, "SELECT label FROM p ORDER BY id", "label").await,
            vec!["ada", "grace"]
        );
        let schema = engine.introspect("main", "p").await.unwrap();
        assert_eq!(schema.indexes[0].column_names(), vec!["label"]);

        engine
            .migrations_down("main", MigrateTarget::Steps(1))
            .await
            .unwrap();
        assert_eq!(
            texts(&engine, "SELECT name FROM p ORDER BY id", "name").await,
            vec!["ada", "grace"]
        );
        let schema = engine.introspect("main", "p").await.unwrap();
        assert_eq!(schema.indexes[0].name, "idx_p_name");
        assert_eq!(schema.indexes[0].column_names(), vec!["name"]);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_mixed_renames_keep_values_both_ways() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let original = seeded_p(&engine).await;

        // `name` is pinned by its index, `note` is not
        let mut columns = original.clone();
        columns[1] = columns[1].clone().renamed("label");
        columns[2] = columns[2].clone().renamed("remark");
        alter(&engine, "p", columns, original).await;

        assert_eq!(
            texts(&engine, "SELECT label FROM p ORDER BY id", "label").await,
            vec!["ada", "grace"]
        );
        assert_eq!(
            texts(&engine, "SELECT remark FROM p ORDER BY id", "remark").await,
            vec!["first", "second"]
        );

        engine
            .migrations_down("main", MigrateTarget::Steps(1))
            .await
            .unwrap();
        assert_eq!(
            texts(&engine, "SELECT name FROM p ORDER BY id", "name").await,
            vec!["ada", "grace"]
        );
        assert_eq!(
            texts(&engine, "SELECT note FROM p ORDER BY id", "note").await,
            vec!["first", "second"]
        );
        let names: Vec<String> = engine
            .introspect("main", "p")
            .await
            .unwrap()
            .columns
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["id", "name", "note"]);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_primary_key_change_keeps_values_both_ways() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let table = Table::new(
            "k",
            vec![
                Column::new("code", "varchar").with_precision("10").primary_key(),
                Column::new("region", "varchar").with_precision("10"),
                Column::new("qty", "integer"),
            ],
        );
        engine
            .apply_structural_change("main", &SchemaChange::CreateTable { table })
            .await
            .unwrap();
        engine
            .driver("main")
            .await
            .unwrap()
            .execute_batch(&[Statement::raw(
                "INSERT INTO k (code, region, qty) VALUES ('a', 'north', 1), ('b', 'south', 2)",
            )])
            .await
            .unwrap();

        let original = engine.introspect("main", "k").await.unwrap().columns;
        let mut columns = original.clone();
        columns[1] = columns[1].clone().primary_key();
        alter(&engine, "k", columns, original).await;

        let keys: Vec<String> = engine
            .introspect("main", "k")
            .await
            .unwrap()
            .columns
            .into_iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name)
            .collect();
        assert_eq!(keys, vec!["code", "region"]);
        assert_eq!(
            texts(&engine, "SELECT region FROM k ORDER BY code", "region").await,
            vec!["north", "south"]
        );

        engine
            .migrations_down("main", MigrateTarget::Steps(1))
            .await
            .unwrap();
        let schema = engine.introspect("main", "k").await.unwrap();
        let keys: Vec<&str> = schema
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(keys, vec!["code"]);
        assert_eq!(
            texts(&engine, "SELECT qty FROM k ORDER BY code", "qty").await,
            vec!["1", "2"]
        );
        engine.close().await;
    }

    #[tokio::test]
    async fn test_schema_change_event_is_emitted() {
        let dir = TempDir::new().unwrap();
        let (sink, mut rx) = ChannelSink::channel(8);
        let engine = engine(&dir).await.with_telemetry(Arc::new(sink));
        engine.apply_structural_change("main", &create_t()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event, telemetry::MIGRATION_UP);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event, telemetry::SCHEMA_CHANGE);
        assert_eq!(second.payload["operation"], "table_create");
        assert_eq!(second.payload["table"], "t");
        engine.close().await;
    }

    // =========================================================================
    // Ledger ordering and atomicity
    // =========================================================================

    #[tokio::test]
    async fn test_failed_unit_leaves_no_ledger_rows() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let unit = engine.migrations_create("main").await.unwrap();
        engine
            .migrations_write(
                "main",
                &unit.title,
                &[
                    Statement::raw("CREATE TABLE a (x integer)"),
                    Statement::raw("CREATE TABLE a (x integer)"),
                    Statement::raw("CREATE TABLE c (x integer)"),
                ],
                &[Statement::raw("DROP TABLE a")],
            )
            .await
            .unwrap();

        let err = engine
            .migrations_up("main", MigrateTarget::Steps(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::DdlExecution { .. }));
        assert!(ledger_titles(&engine).await.is_empty());
        let driver = engine.driver("main").await.unwrap();
        assert!(!driver.has_table("a").await.unwrap());
        assert!(!driver.has_table("c").await.unwrap());
        assert_eq!(engine.migrations_list("main").await.unwrap().pending, 1);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_failed_change_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        engine.apply_structural_change("main", &create_t()).await.unwrap();

        let err = engine
            .apply_structural_change("main", &create_t())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::DdlExecution { .. }));
        let listing = engine.migrations_list("main").await.unwrap();
        assert_eq!(listing.listing.len(), 1);
        assert_eq!(listing.pending, 0);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_missing_units_make_history_dirty() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        engine.apply_structural_change("main", &create_t()).await.unwrap();
        let listing = engine.migrations_list("main").await.unwrap();
        engine
            .store()
            .delete("main", &listing.listing[0].title)
            .await
            .unwrap();

        let err = engine
            .migrations_up("main", MigrateTarget::Steps(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MigrateError::MigrationOrder(OrderError::Dirty { units: 0, applied: 1 })
        ));
        assert!(err.is_fatal());
        engine.close().await;
    }

    #[tokio::test]
    async fn test_until_unknown_title_is_not_found() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        engine.migrations_create("main").await.unwrap();
        let err = engine
            .migrations_up(
                "main",
                MigrateTarget::Until("20000101_000000000_zzzzzz.up.sql".into()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 7);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_until_accepts_bare_stem() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        engine.apply_structural_change("main", &create_t()).await.unwrap();
        let title = ledger_titles(&engine).await[0].clone();
        let stem = title::stem_of(&title).to_string();

        let down = engine
            .migrations_down("main", MigrateTarget::Until(stem.clone()))
            .await
            .unwrap();
        assert_eq!(down.applied_titles, vec![title.clone()]);

        let up = engine
            .migrate("main", MigrateTarget::Until(stem))
            .await
            .unwrap();
        assert_eq!(up.applied_titles, vec![title]);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_readers_wait_for_running_change() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        engine.apply_structural_change("main", &create_t()).await.unwrap();

        let lock = engine.alias_lock("main").await;
        let guard = lock.write().await;
        let wait = Duration::from_millis(100);
        assert!(tokio::time::timeout(wait, engine.introspect("main", "t"))
            .await
            .is_err());
        assert!(tokio::time::timeout(wait, engine.migrations_list("main"))
            .await
            .is_err());
        assert!(tokio::time::timeout(wait, engine.plan_change("main", &create_t()))
            .await
            .is_err());
        drop(guard);

        assert_eq!(engine.introspect("main", "t").await.unwrap().columns.len(), 2);
        assert_eq!(engine.migrations_list("main").await.unwrap().listing.len(), 1);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_up_until_applies_in_one_batch() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let mut titles = Vec::new();
        for name in ["a", "b", "c"] {
            let unit = engine.migrations_create("main").await.unwrap();
            let create = format!("CREATE TABLE {} (x integer)", name);
            let drop = format!("DROP TABLE {}", name);
            engine
                .migrations_write("main", &unit.title, &[Statement::raw(create)], &[Statement::raw(drop)])
                .await
                .unwrap();
            titles.push(unit.title);
        }

        let outcome = engine
            .migrate("main", MigrateTarget::Until(titles[1].clone()))
            .await
            .unwrap();
        assert_eq!(outcome.pending, 3);
        assert_eq!(outcome.applied_titles, titles[..2].to_vec());
        let applied = engine.applied("main").await.unwrap();
        assert!(applied.iter().all(|a| a.batch == 1));

        engine.migrate("main", MigrateTarget::Steps(5)).await.unwrap();
        let applied = engine.applied("main").await.unwrap();
        assert_eq!(applied[2].batch, 2);

        let down = engine
            .migrations_down("main", MigrateTarget::Until(titles[1].clone()))
            .await
            .unwrap();
        assert_eq!(down.applied_titles, vec![titles[2].clone(), titles[1].clone()]);
        assert_eq!(ledger_titles(&engine).await, vec![titles[0].clone()]);
        engine.close().await;
    }

    // =========================================================================
    // Unit lifecycle
    // =========================================================================

    #[tokio::test]
    async fn test_write_and_to_sql() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let unit = engine.migrations_create("main").await.unwrap();
        assert_eq!(unit.state, UnitState::Created);

        engine
            .migrations_write(
                "main",
                unit.stem(),
                &[Statement::raw("CREATE TABLE w (x integer)")],
                &[Statement::raw("DROP TABLE w")],
            )
            .await
            .unwrap();
        let (up, down) = engine.migrations_to_sql("main", &unit.title).await.unwrap();
        assert_eq!(up, "/* xc */\nCREATE TABLE w (x integer);\n");
        assert_eq!(down, "/* xc */\nDROP TABLE w;\n");

        engine
            .migrations_up("main", MigrateTarget::Steps(1))
            .await
            .unwrap();
        let err = engine
            .migrations_write("main", &unit.title, &[], &[])
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 9);

        let missing = engine
            .migrations_to_sql("main", "20000101_000000000_zzzzzz")
            .await
            .unwrap_err();
        assert_eq!(missing.exit_code(), 7);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_delete_applied_unit_ordering() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        engine.apply_structural_change("main", &create_t()).await.unwrap();
        let second = SchemaChange::CreateTable {
            table: Table::new("u", vec![Column::new("id", "integer").primary_key()]),
        };
        engine.apply_structural_change("main", &second).await.unwrap();
        let listing = engine.migrations_list("main").await.unwrap().listing;

        let err = engine
            .migrations_delete("main", &listing[0].title)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::MigrationOrder(OrderError::Applied(_))));
        assert_eq!(err.exit_code(), 9);

        let outcome = engine
            .migrations_delete("main", &listing[1].title)
            .await
            .unwrap();
        assert_eq!(outcome.applied_titles, vec![listing[1].title.clone()]);
        let driver = engine.driver("main").await.unwrap();
        assert!(!driver.has_table("u").await.unwrap());
        let remaining = engine.migrations_list("main").await.unwrap().listing;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, listing[0].title);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_unknown_alias_is_config_error() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let err = engine.migrations_create("nope").await.unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        let err = engine.introspect("nope", "t").await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    // =========================================================================
    // Provisioning and health
    // =========================================================================

    #[tokio::test]
    async fn test_init_and_clean_alias() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let outcome = engine.init_alias("main").await.unwrap();
        assert!(outcome.database_created);
        assert!(outcome.ledger_created);
        assert!(dir.path().join("main.db").exists());

        let again = engine.init_alias("main").await.unwrap();
        assert!(!again.database_created);
        assert!(!again.ledger_created);

        engine.clean_alias("main").await.unwrap();
        assert!(!dir.path().join("main.db").exists());
    }

    #[tokio::test]
    async fn test_health_check_reports_version() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let result = engine.health_check().await;
        assert!(result.healthy);
        assert_eq!(result.aliases[0].alias, "main");
        assert_eq!(result.aliases[0].db_type, "sqlite");
        assert!(result.aliases[0].version.as_deref().unwrap().starts_with('3'));
        engine.close().await;
    }
}
