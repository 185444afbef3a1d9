//! Unit stores.
//!
//! The [`LedgerStore`] trait defines where migration units live:
//!
//! - **Files**: [`FsLedgerStore`], paired `<title>.up.sql` / `<title>.down.sql`
//!   files under `<dir>/<alias>/`
//! - **Database**: [`DbLedgerStore`], rows of a bookkeeping table reached
//!   through the driver of a meta alias
//!
//! # Design Pattern
//!
//! Strategy: the engine works with `Arc<dyn LedgerStore>` without knowing
//! the concrete store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::schema::{Column, Table};
use crate::core::statement::Statement;
use crate::core::traits::{Dialect, Driver};
use crate::core::value::Record;
use crate::ddl::table::create_table;
use crate::error::{MigrateError, Result};

use super::title::{self, DOWN_SUFFIX, UP_SUFFIX};
use super::unit::{MigrationUnit, UnitState};

/// Persistence for migration units.
///
/// Implementations must be `Send + Sync` to allow sharing across async tasks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Units of `alias` in title order.
    async fn list(&self, alias: &str) -> Result<Vec<MigrationUnit>>;

    async fn get(&self, alias: &str, title: &str) -> Result<Option<MigrationUnit>>;

    /// Insert or replace a unit.
    async fn insert(&self, unit: &MigrationUnit) -> Result<()>;

    async fn delete(&self, alias: &str, title: &str) -> Result<()>;

    /// Store kind for logging.
    fn kind(&self) -> &'static str;

    /// Whether the store persists unit state and batch.
    fn tracks_state(&self) -> bool {
        false
    }
}

// =============================================================================
// File store
// =============================================================================

/// Units as paired SQL files.
#[derive(Debug, Clone)]
pub struct FsLedgerStore {
    root: PathBuf,
}

impl FsLedgerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn alias_dir(&self, alias: &str) -> PathBuf {
        self.root.join(alias)
    }

    fn paths(&self, alias: &str, title: &str) -> (PathBuf, PathBuf) {
        let stem = title::stem_of(title);
        let dir = self.alias_dir(alias);
        (dir.join(title::up_title(stem)), dir.join(title::down_title(stem)))
    }

    async fn read_unit(&self, alias: &str, stem: &str) -> Result<Option<MigrationUnit>> {
        let (up_path, down_path) = self.paths(alias, stem);
        let up = match tokio::fs::read_to_string(&up_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let down = match tokio::fs::read_to_string(&down_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut unit = MigrationUnit::new(alias, stem);
        if !(up.trim().is_empty() && down.trim().is_empty()) {
            unit.set_text(up, down);
            unit.state = UnitState::Written;
        }
        Ok(Some(unit))
    }
}

/// Write via a temp file and rename so readers never see half a unit.
async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, content).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl LedgerStore for FsLedgerStore {
    async fn list(&self, alias: &str) -> Result<Vec<MigrationUnit>> {
        let dir = self.alias_dir(alias);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut stems = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(UP_SUFFIX) {
                if title::is_stem(stem) {
                    stems.push(stem.to_string());
                } else {
                    debug!("Ignoring {} in {}", name, dir.display());
                }
            }
        }
        stems.sort();

        let mut units = Vec::with_capacity(stems.len());
        for stem in stems {
            if let Some(unit) = self.read_unit(alias, &stem).await? {
                units.push(unit);
            }
        }
        Ok(units)
    }

    async fn get(&self, alias: &str, title: &str) -> Result<Option<MigrationUnit>> {
        self.read_unit(alias, title::stem_of(title)).await
    }

    async fn insert(&self, unit: &MigrationUnit) -> Result<()> {
        let dir = self.alias_dir(&unit.alias);
        tokio::fs::create_dir_all(&dir).await?;
        let (up_path, down_path) = self.paths(&unit.alias, &unit.title);
        write_atomic(&up_path, &unit.up).await?;
        write_atomic(&down_path, &unit.down).await?;
        debug!("Wrote {}{{{},{}}}", dir.join(unit.stem()).display(), UP_SUFFIX, DOWN_SUFFIX);
        Ok(())
    }

    async fn delete(&self, alias: &str, title: &str) -> Result<()> {
        let (up_path, down_path) = self.paths(alias, title);
        remove_if_exists(&up_path).await?;
        remove_if_exists(&down_path).await?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "files"
    }
}

// =============================================================================
// Database store
// =============================================================================

const UNIT_COLUMNS: [&str; 8] = [
    "alias",
    "title",
    "title_down",
    "up",
    "down",
    "status",
    "batch",
    "checksum",
];

/// Units as rows of a bookkeeping table on the meta alias.
pub struct DbLedgerStore {
    driver: Arc<dyn Driver>,
    table: String,
}

impl DbLedgerStore {
    /// Open the store, creating the bookkeeping table if missing.
    pub async fn open(driver: Arc<dyn Driver>, table: impl Into<String>) -> Result<Self> {
        let store = Self {
            driver,
            table: table.into(),
        };
        if !store.driver.has_table(&store.table).await? {
            let ddl = create_table(store.dialect(), &store.definition(), &[])?;
            store.driver.execute_batch(&ddl.up).await?;
            info!("Created migration unit table '{}'", store.table);
        }
        Ok(store)
    }

    fn dialect(&self) -> &dyn Dialect {
        self.driver.dialect()
    }

    /// Canonical definition of the bookkeeping table, keyed by (alias, title).
    pub fn definition(&self) -> Table {
        let syntax = self.dialect().syntax();
        let text = |name: &str| Column::new(name, "varchar").with_precision("255");
        let long = |name: &str| {
            let (data_type, precision) = syntax.long_text;
            let column = Column::new(name, data_type);
            match precision {
                Some(p) => column.with_precision(p),
                None => column,
            }
        };
        Table::new(
            self.table.clone(),
            vec![
                text("alias").primary_key(),
                text("title").primary_key(),
                text("title_down"),
                long("up"),
                long("down"),
                text("status"),
                Column::new("batch", "integer"),
                text("checksum"),
                Column::new("created", syntax.timestamp_type),
                Column::new("updated", syntax.timestamp_type),
            ],
        )
    }

    fn select(&self, alias: &str, title: Option<&str>) -> Result<String> {
        let d = self.dialect();
        Ok(d.builder()
            .raw("SELECT ")
            .idents(&UNIT_COLUMNS)
            .raw(" FROM ")
            .qualified(d.schema(), &self.table)
            .raw(" WHERE ")
            .ident("alias")
            .raw(" = ")
            .value(alias)
            .when(title.is_some(), |b| {
                b.raw(" AND ")
                    .ident("title")
                    .raw(" = ")
                    .value(title.unwrap_or_default())
            })
            .raw(" ORDER BY ")
            .ident("title")
            .build()?
            .into_string())
    }

    fn delete_statement(&self, alias: &str, title: &str) -> Result<Statement> {
        let d = self.dialect();
        d.builder()
            .raw("DELETE FROM ")
            .qualified(d.schema(), &self.table)
            .raw(" WHERE ")
            .ident("alias")
            .raw(" = ")
            .value(alias)
            .raw(" AND ")
            .ident("title")
            .raw(" = ")
            .value(title)
            .build()
    }

    fn insert_statement(&self, unit: &MigrationUnit) -> Result<Statement> {
        let d = self.dialect();
        let now = d.syntax().now;
        let batch = unit
            .batch
            .map_or_else(|| "NULL".to_string(), |b| b.to_string());
        d.builder()
            .raw("INSERT INTO ")
            .qualified(d.schema(), &self.table)
            .raw(" (")
            .idents(&UNIT_COLUMNS)
            .raw(", ")
            .idents(&["created", "updated"])
            .raw(") VALUES (")
            .value(&unit.alias)
            .raw(", ")
            .value(&unit.title)
            .raw(", ")
            .value(&unit.title_down)
            .raw(", ")
            .value(&unit.up)
            .raw(", ")
            .value(&unit.down)
            .raw(", ")
            .value(unit.state.as_str())
            .raw(&format!(", {}, ", batch))
            .value(unit.checksum.as_deref().unwrap_or_default())
            .raw(&format!(", {}, {})", now, now))
            .build()
    }

    fn unit_from_record(record: &Record) -> Result<MigrationUnit> {
        let alias = record.text("alias");
        let title = record.text("title");
        let mut unit = MigrationUnit::new(alias, title::stem_of(&title));
        unit.set_text(record.text("up"), record.text("down"));
        unit.state = UnitState::parse(&record.text("status"))?;
        unit.batch = record.get_i64("batch");
        if let Some(checksum) = record.opt_text("checksum") {
            unit.checksum = Some(checksum);
        }
        Ok(unit)
    }
}

#[async_trait]
impl LedgerStore for DbLedgerStore {
    async fn list(&self, alias: &str) -> Result<Vec<MigrationUnit>> {
        let rows = self.driver.query(&self.select(alias, None)?).await?;
        rows.iter().map(Self::unit_from_record).collect()
    }

    async fn get(&self, alias: &str, title: &str) -> Result<Option<MigrationUnit>> {
        let title = title::up_title(title::stem_of(title));
        let rows = self.driver.query(&self.select(alias, Some(&title))?).await?;
        rows.first().map(Self::unit_from_record).transpose()
    }

    async fn insert(&self, unit: &MigrationUnit) -> Result<()> {
        if unit.alias.is_empty() {
            return Err(MigrateError::Config("migration unit has no alias".into()));
        }
        let statements = vec![
            self.delete_statement(&unit.alias, &unit.title)?,
            self.insert_statement(unit)?,
        ];
        self.driver.execute_batch(&statements).await
    }

    async fn delete(&self, alias: &str, title: &str) -> Result<()> {
        let title = title::up_title(title::stem_of(title));
        let statement = self.delete_statement(alias, &title)?;
        self.driver.execute_batch(&[statement]).await
    }

    fn kind(&self) -> &'static str {
        "database"
    }

    fn tracks_state(&self) -> bool {
        true
    }
}
