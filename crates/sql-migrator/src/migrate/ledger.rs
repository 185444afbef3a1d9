//! Applied-migration ledger kept inside each target database.
//!
//! One row per applied unit, in a table named by
//! `migrations.evolutions_table` (default `nc_evolutions`). The ledger only
//! renders statements; the engine runs them in the same transaction as the
//! unit's own DDL so the ledger never disagrees with the schema.

use serde::Serialize;
use tracing::info;

use crate::core::change::DdlPair;
use crate::core::schema::{Column, Table};
use crate::core::statement::Statement;
use crate::core::traits::{Dialect, Driver};
use crate::core::value::Record;
use crate::ddl::table::create_table;
use crate::error::Result;

use super::unit::MigrationUnit;

const COLUMNS: [&str; 6] = ["title", "title_down", "description", "batch", "checksum", "status"];

/// One applied-ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub title: String,
    pub title_down: String,
    pub description: Option<String>,
    pub batch: i64,
    pub checksum: Option<String>,
    pub status: String,
}

impl AppliedMigration {
    fn from_record(record: &Record) -> Self {
        Self {
            title: record.text("title"),
            title_down: record.text("title_down"),
            description: record.opt_text("description"),
            batch: record.get_i64("batch").unwrap_or(0),
            checksum: record.opt_text("checksum"),
            status: record.text("status"),
        }
    }
}

/// The applied ledger of one database.
#[derive(Debug, Clone)]
pub struct EvolutionLedger {
    table: String,
}

impl EvolutionLedger {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Canonical definition of the ledger table for `d`.
    pub fn definition(&self, d: &dyn Dialect) -> Table {
        let syntax = d.syntax();
        let text = |name: &str| Column::new(name, "varchar").with_precision("255");
        let (long_type, long_precision) = syntax.long_text;
        let mut description = Column::new("description", long_type);
        if let Some(precision) = long_precision {
            description = description.with_precision(precision);
        }
        Table::new(
            self.table.clone(),
            vec![
                Column::new("id", "integer").primary_key().auto_increment(),
                text("title").required(),
                text("title_down"),
                description,
                Column::new("batch", "integer"),
                text("checksum"),
                text("status"),
                text("created"),
                Column::new("created_at", syntax.timestamp_type),
                Column::new("updated_at", syntax.timestamp_type),
            ],
        )
    }

    pub fn create_statements(&self, d: &dyn Dialect) -> Result<DdlPair> {
        create_table(d, &self.definition(d), &[])
    }

    /// Create the ledger table when the database does not have it yet.
    pub async fn ensure(&self, driver: &dyn Driver) -> Result<bool> {
        if driver.has_table(&self.table).await? {
            return Ok(false);
        }
        let ddl = self.create_statements(driver.dialect())?;
        driver.execute_batch(&ddl.up).await?;
        info!("Created migration ledger table '{}'", self.table);
        Ok(true)
    }

    pub fn list_query(&self, d: &dyn Dialect) -> Result<String> {
        Ok(d.builder()
            .raw("SELECT ")
            .idents(&COLUMNS)
            .raw(" FROM ")
            .qualified(d.schema(), &self.table)
            .raw(" ORDER BY ")
            .ident("title")
            .build()?
            .into_string())
    }

    /// Applied rows ordered by title. A database without the ledger table
    /// has applied nothing.
    pub async fn list(&self, driver: &dyn Driver) -> Result<Vec<AppliedMigration>> {
        if !driver.has_table(&self.table).await? {
            return Ok(Vec::new());
        }
        let rows = driver.query(&self.list_query(driver.dialect())?).await?;
        Ok(rows.iter().map(AppliedMigration::from_record).collect())
    }

    /// Row recording `unit` as applied in `batch`.
    pub fn insert(&self, d: &dyn Dialect, unit: &MigrationUnit, batch: i64) -> Result<Statement> {
        let syntax = d.syntax();
        let created = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        d.builder()
            .raw("INSERT INTO ")
            .qualified(d.schema(), &self.table)
            .raw(" (")
            .idents(&COLUMNS)
            .raw(", ")
            .idents(&["created", "created_at", "updated_at"])
            .raw(") VALUES (")
            .value(&unit.title)
            .raw(", ")
            .value(&unit.title_down)
            .raw(", ")
            .value(unit.stem())
            .raw(&format!(", {}, ", batch))
            .value(unit.checksum.as_deref().unwrap_or_default())
            .raw(", ")
            .value("applied")
            .raw(", ")
            .value(&created)
            .raw(&format!(", {}, {})", syntax.now, syntax.now))
            .build()
    }

    pub fn delete(&self, d: &dyn Dialect, title: &str) -> Result<Statement> {
        d.builder()
            .raw("DELETE FROM ")
            .qualified(d.schema(), &self.table)
            .raw(" WHERE ")
            .ident("title")
            .raw(" = ")
            .value(title)
            .build()
    }
}

/// Batch number for the next `up`: one past the highest recorded.
pub fn next_batch(applied: &[AppliedMigration]) -> i64 {
    applied.iter().map(|a| a.batch).max().unwrap_or(0) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{MssqlDialect, MysqlDialect, SqliteDialect};

    fn unit() -> MigrationUnit {
        let mut unit = MigrationUnit::new("main", "20240309_123005000_ab12cd");
        unit.write(&[Statement::raw("CREATE TABLE t (id int)")], &[]);
        unit
    }

    #[test]
    fn test_definition_uses_dialect_types() {
        let ledger = EvolutionLedger::new("nc_evolutions");
        let mssql = MssqlDialect::new(None);
        let table = ledger.definition(&mssql);
        assert_eq!(table.primary_key, vec!["id"]);
        let description = table.column("description").unwrap();
        assert_eq!(description.data_type, "nvarchar");
        assert_eq!(description.precision.as_deref(), Some("max"));
        assert_eq!(table.column("created_at").unwrap().data_type, "datetime2");
    }

    #[test]
    fn test_create_statements_sqlite() {
        let ledger = EvolutionLedger::new("nc_evolutions");
        let ddl = ledger.create_statements(&SqliteDialect::new(false)).unwrap();
        let create = ddl.up[0].sql();
        assert!(create.starts_with("CREATE TABLE \"nc_evolutions\""));
        assert!(create.contains("\"id\" integer"));
        assert!(create.contains("\"title\" varchar(255) NOT NULL"));
        assert_eq!(ddl.down[0].sql(), "DROP TABLE \"nc_evolutions\"");
    }

    #[test]
    fn test_insert_and_delete_statements() {
        let ledger = EvolutionLedger::new("nc_evolutions");
        let mysql = MysqlDialect::new();
        let insert = ledger.insert(&mysql, &unit(), 3).unwrap();
        let sql = insert.sql();
        assert!(sql.starts_with("INSERT INTO `nc_evolutions` (`title`, `title_down`"));
        assert!(sql.contains("'20240309_123005000_ab12cd.up.sql'"));
        assert!(sql.contains(", 3, '"));
        assert!(sql.ends_with("CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)"));

        let delete = ledger
            .delete(&mysql, "20240309_123005000_ab12cd.up.sql")
            .unwrap();
        assert_eq!(
            delete.sql(),
            "DELETE FROM `nc_evolutions` WHERE `title` = '20240309_123005000_ab12cd.up.sql'"
        );
    }

    #[test]
    fn test_list_query_is_qualified() {
        let ledger = EvolutionLedger::new("nc_evolutions");
        let sql = ledger.list_query(&MssqlDialect::new(Some("app"))).unwrap();
        assert!(sql.contains("FROM [app].[nc_evolutions] ORDER BY [title]"));
    }

    #[test]
    fn test_next_batch() {
        assert_eq!(next_batch(&[]), 1);
        let row = |batch| AppliedMigration {
            title: "a".into(),
            title_down: "b".into(),
            description: None,
            batch,
            checksum: None,
            status: "applied".into(),
        };
        assert_eq!(next_batch(&[row(1), row(4), row(2)]), 5);
    }

    #[test]
    fn test_row_from_record() {
        let record = Record::from_pairs(&[
            ("TITLE", Some("x.up.sql")),
            ("title_down", Some("x.down.sql")),
            ("description", None),
            ("batch", Some("2")),
            ("checksum", Some("")),
            ("status", Some("applied")),
        ]);
        let row = AppliedMigration::from_record(&record);
        assert_eq!(row.title, "x.up.sql");
        assert_eq!(row.batch, 2);
        assert_eq!(row.checksum, None);
    }
}
