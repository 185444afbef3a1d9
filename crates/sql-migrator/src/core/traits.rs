//! Core traits for database-agnostic schema management.
//!
//! This module defines the primary abstractions used by the migration engine:
//!
//! - [`Dialect`]: SQL syntax strategy, backed by a per-engine [`SyntaxTable`]
//! - [`Driver`]: Introspection, planning and transactional execution against
//!   one configured connection
//! - [`AdminHandle`]: Database-level provisioning through a connection that is
//!   not bound to the database itself
//!
//! # Design Patterns
//!
//! - **Strategy**: Dialects plug syntax into the shared DDL generator
//! - **Template Method**: [`Driver::plan`] gathers catalog facts and delegates
//!   to the generator; drivers override the pieces their engine needs

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::DbType;
use crate::error::{MigrateError, Result};

use super::change::{CatalogFacts, DdlPair, Plan, SchemaChange, TableSnapshot};
use super::schema::{
    Column, Index, Relation, Routine, Sequence, Table, TableSchema, Trigger, VersionInfo, View,
};
use super::statement::{Quoting, Statement, StatementBuilder};
use super::value::Record;

/// How a column definition change is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterColumnStyle {
    /// `ALTER TABLE t CHANGE COLUMN old new <definition>` (MySQL)
    Change,
    /// `sp_rename` plus `ALTER COLUMN` plus named default constraints (SQL Server)
    AlterColumn,
    /// `RENAME COLUMN` plus `MODIFY (...)` (Oracle)
    Modify,
    /// `RENAME COLUMN` plus `ALTER COLUMN ... SET DATA TYPE` (Snowflake)
    SetDataType,
    /// Rename to a disposable name, add, copy, drop (SQLite)
    Copy,
}

/// How auto-increment columns are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoIncrementStyle {
    /// Keyword appended to the column definition.
    Keyword(&'static str),
    /// An `integer` primary key aliases the rowid (SQLite).
    IntegerRowid,
}

/// How auto-update timestamp columns are maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoUpdateStyle {
    /// `ON UPDATE CURRENT_TIMESTAMP` in the column definition (MySQL)
    OnUpdateClause,
    /// `AFTER UPDATE` trigger joined against `Inserted` (SQL Server)
    InsertedTrigger,
    /// `AFTER UPDATE ... FOR EACH ROW` trigger keyed on `old` (SQLite)
    RowTrigger,
    /// `BEFORE UPDATE ... FOR EACH ROW` assigning `:NEW` (Oracle)
    BeforeRowTrigger,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameStyle {
    /// `RENAME TABLE a TO b` (MySQL)
    RenameTable,
    /// `EXEC sp_rename 'schema.a', 'b'` (SQL Server)
    SpRename,
    /// `ALTER TABLE a RENAME TO b`
    AlterRenameTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewUpdateStyle {
    CreateOrReplace,
    /// `ALTER VIEW v AS ...` (SQL Server)
    Alter,
    DropCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceRename {
    /// `ALTER SEQUENCE a RENAME TO b`
    AlterSequence,
    /// `RENAME a TO b` (Oracle)
    Rename,
    /// `EXEC sp_rename` (SQL Server)
    SpRename,
}

/// Shape of a user-defined trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStyle {
    /// `CREATE TRIGGER n BEFORE INSERT ON t FOR EACH ROW <stmt>` (MySQL)
    RowLevel,
    /// Row level with the body wrapped in `BEGIN ... END` (SQLite, Oracle)
    RowLevelBlock,
    /// `CREATE TRIGGER n ON t AFTER INSERT AS <stmt>` (SQL Server)
    StatementLevel,
}

/// How primary key constraints are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkNaming {
    /// Unnamed; dropped with `DROP PRIMARY KEY`.
    Anonymous,
    /// `<prefix><table>`, e.g. `PK_users`.
    Prefix(&'static str),
    /// `<table><suffix>`, e.g. `users_pkey`.
    Suffix(&'static str),
}

impl PkNaming {
    pub fn name_for(&self, table: &str) -> Option<String> {
        match self {
            PkNaming::Anonymous => None,
            PkNaming::Prefix(p) => Some(format!("{}{}", p, table)),
            PkNaming::Suffix(s) => Some(format!("{}{}", table, s)),
        }
    }
}

/// Object kinds beyond tables and columns that a dialect can manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectSupport {
    pub indexes: bool,
    pub sequences: bool,
    pub triggers: bool,
    pub views: bool,
    pub routines: bool,
}

/// Static syntax facts of one engine.
///
/// The DDL generator is written once and consults this table wherever the
/// engines disagree.
#[derive(Debug, Clone, Copy)]
pub struct SyntaxTable {
    pub name: &'static str,
    pub quoting: Quoting,
    pub alter_column: AlterColumnStyle,
    pub auto_increment: AutoIncrementStyle,
    pub auto_update: AutoUpdateStyle,
    pub rename: RenameStyle,
    pub view_update: ViewUpdateStyle,
    pub sequence_rename: SequenceRename,
    pub trigger_style: TriggerStyle,
    pub objects: ObjectSupport,
    /// Types rendered without a precision clause.
    pub length_suppressed: &'static [&'static str],
    pub pk_naming: PkNaming,
    /// Defaults are named constraints (`DF_<table>_<column>`).
    pub default_constraints: bool,
    /// `NOT NULL` follows the `DEFAULT` clause.
    pub null_after_default: bool,
    /// Nullable columns spell out `NULL`.
    pub explicit_null: bool,
    pub unsigned: bool,
    pub inline_comments: bool,
    /// `DROP INDEX i ON t` rather than `DROP INDEX i`.
    pub drop_index_on_table: bool,
    /// Keyword after `DROP` when removing a foreign key.
    pub drop_foreign_key: &'static str,
    /// Foreign keys only exist inside `CREATE TABLE` (SQLite).
    pub inline_foreign_keys: bool,
    pub fk_on_update: bool,
    pub fk_restrict: bool,
    pub timestamp_type: &'static str,
    /// Type and precision for unbounded text.
    pub long_text: (&'static str, Option<&'static str>),
    pub now: &'static str,
}

impl SyntaxTable {
    pub fn suppresses_length(&self, data_type: &str) -> bool {
        let lower = data_type.trim().to_ascii_lowercase();
        self.length_suppressed.iter().any(|t| *t == lower)
    }
}

/// SQL syntax strategy for one engine.
pub trait Dialect: Send + Sync {
    fn syntax(&self) -> &SyntaxTable;

    /// Schema that unqualified names resolve to, if the engine has one.
    fn schema(&self) -> Option<&str> {
        None
    }

    fn name(&self) -> &str {
        self.syntax().name
    }

    fn quoting(&self) -> Quoting {
        self.syntax().quoting
    }

    fn builder(&self) -> StatementBuilder {
        self.quoting().builder()
    }

    /// Emit a `SELECT 1 FROM t LIMIT 1` probe ahead of table edits.
    fn select_probe(&self) -> bool {
        false
    }

    /// Text handed to the engine for one statement.
    fn finalize(&self, statement: &Statement) -> String {
        statement.sql().to_string()
    }

    fn unsupported(&self, operation: &str) -> MigrateError {
        MigrateError::unsupported(self.name(), operation)
    }
}

/// One configured connection: introspection, planning, execution.
#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    fn db_type(&self) -> DbType;

    /// Round-trip a trivial query.
    async fn test_connection(&self) -> Result<()>;

    async fn version(&self) -> Result<VersionInfo>;

    async fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self
            .table_list()
            .await?
            .iter()
            .any(|t| t == table || t.eq_ignore_ascii_case(table)))
    }

    async fn table_list(&self) -> Result<Vec<String>>;

    async fn schema_list(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn column_list(&self, table: &str) -> Result<Vec<Column>>;

    async fn index_list(&self, table: &str) -> Result<Vec<Index>>;

    async fn relation_list(&self, table: &str) -> Result<Vec<Relation>>;

    /// Foreign keys of every table.
    async fn relation_list_all(&self) -> Result<Vec<Relation>> {
        let mut all = Vec::new();
        for table in self.table_list().await? {
            all.extend(self.relation_list(&table).await?);
        }
        Ok(all)
    }

    async fn trigger_list(&self, _table: &str) -> Result<Vec<Trigger>> {
        Ok(Vec::new())
    }

    async fn view_list(&self) -> Result<Vec<View>> {
        Ok(Vec::new())
    }

    async fn function_list(&self) -> Result<Vec<Routine>> {
        Ok(Vec::new())
    }

    async fn procedure_list(&self) -> Result<Vec<Routine>> {
        Ok(Vec::new())
    }

    async fn sequence_list(&self) -> Result<Vec<Sequence>> {
        Ok(Vec::new())
    }

    /// Run a query and return its rows as text.
    async fn query(&self, sql: &str) -> Result<Vec<Record>>;

    /// Execute statements in order inside one transaction.
    ///
    /// Either every statement takes effect or none does (subject to engines
    /// that commit DDL implicitly). A failure reports the offending statement.
    async fn execute_batch(&self, statements: &[Statement]) -> Result<()>;

    /// Name of the live primary key constraint.
    async fn pk_constraint(&self, _table: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Current definition of a table, with its indexes and foreign keys.
    async fn snapshot(&self, table: &str) -> Result<TableSnapshot> {
        let columns = self.column_list(table).await?;
        if columns.is_empty() {
            return Err(MigrateError::TableNotFound(table.to_string()));
        }
        let mut snapshot_table = Table::new(table, columns);
        if let Some(schema) = self.dialect().schema() {
            snapshot_table = snapshot_table.in_schema(schema);
        }
        Ok(TableSnapshot {
            table: snapshot_table,
            indexes: self.index_list(table).await?,
            relations: self.relation_list(table).await?,
        })
    }

    /// Columns, indexes and foreign keys of one table.
    async fn introspect(&self, table: &str) -> Result<TableSchema> {
        let columns = self.column_list(table).await?;
        if columns.is_empty() {
            return Err(MigrateError::TableNotFound(table.to_string()));
        }
        Ok(TableSchema {
            table: table.to_string(),
            columns,
            indexes: self.index_list(table).await?,
            relations: self.relation_list(table).await?,
        })
    }

    /// Gather the catalog facts `change` depends on.
    async fn facts(&self, change: &SchemaChange) -> Result<CatalogFacts> {
        match change {
            SchemaChange::DropTable { table } => Ok(CatalogFacts {
                snapshot: Some(self.snapshot(table).await?),
                ..Default::default()
            }),
            SchemaChange::AlterTable { table, .. } => Ok(CatalogFacts {
                pk_constraint: self.pk_constraint(table).await?,
                ..Default::default()
            }),
            _ => Ok(CatalogFacts::default()),
        }
    }

    /// Generate forward and reverse DDL for `change` without executing it.
    async fn plan(&self, change: &SchemaChange) -> Result<Plan> {
        let facts = self.facts(change).await?;
        crate::ddl::plan(self.dialect(), change, &facts)
    }

    /// Expand the table rebuilds of `plan` into its DDL.
    async fn expand_plan(&self, _change: &SchemaChange, plan: Plan) -> Result<DdlPair> {
        if plan.needs_rebuild() {
            return Err(self.dialect().unsupported("table rebuild"));
        }
        Ok(plan.ddl)
    }

    /// Close the connection pool.
    async fn close(&self);
}

/// Database-level operations through a connection without a default database.
#[async_trait]
pub trait AdminHandle: Send + Sync {
    async fn has_database(&self, name: &str) -> Result<bool>;

    async fn database_list(&self) -> Result<Vec<String>>;

    async fn create_database_if_not_exists(&self, name: &str) -> Result<()>;

    async fn drop_database(&self, name: &str) -> Result<()>;

    async fn close(&self);
}

/// Run `fut`, failing with `Timeout` once `limit` elapses.
pub async fn bounded<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| MigrateError::Timeout(limit))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::{LiteralStyle, QuoteStyle};

    static TABLE: SyntaxTable = SyntaxTable {
        name: "test",
        quoting: Quoting::new(QuoteStyle::DoubleQuote, LiteralStyle::Standard),
        alter_column: AlterColumnStyle::Modify,
        auto_increment: AutoIncrementStyle::Keyword("IDENTITY"),
        auto_update: AutoUpdateStyle::Unsupported,
        rename: RenameStyle::AlterRenameTo,
        view_update: ViewUpdateStyle::DropCreate,
        sequence_rename: SequenceRename::AlterSequence,
        trigger_style: TriggerStyle::RowLevel,
        objects: ObjectSupport {
            indexes: true,
            sequences: false,
            triggers: false,
            views: false,
            routines: false,
        },
        length_suppressed: &["text", "int"],
        pk_naming: PkNaming::Anonymous,
        default_constraints: false,
        null_after_default: false,
        explicit_null: true,
        unsigned: false,
        inline_comments: false,
        drop_index_on_table: false,
        drop_foreign_key: "CONSTRAINT",
        inline_foreign_keys: false,
        fk_on_update: true,
        fk_restrict: true,
        timestamp_type: "timestamp",
        long_text: ("text", None),
        now: "CURRENT_TIMESTAMP",
    };

    struct TestDialect;

    impl Dialect for TestDialect {
        fn syntax(&self) -> &SyntaxTable {
            &TABLE
        }
    }

    #[test]
    fn test_suppresses_length_is_case_insensitive() {
        assert!(TABLE.suppresses_length("TEXT"));
        assert!(TABLE.suppresses_length(" int "));
        assert!(!TABLE.suppresses_length("varchar"));
    }

    #[test]
    fn test_pk_naming() {
        assert_eq!(PkNaming::Anonymous.name_for("t"), None);
        assert_eq!(PkNaming::Prefix("PK_").name_for("t"), Some("PK_t".to_string()));
        assert_eq!(PkNaming::Suffix("_pkey").name_for("t"), Some("t_pkey".to_string()));
    }

    #[test]
    fn test_dialect_defaults() {
        let dialect = TestDialect;
        assert_eq!(dialect.name(), "test");
        assert_eq!(dialect.schema(), None);
        assert!(!dialect.select_probe());
        let err = dialect.unsupported("sequence create");
        assert!(err.to_string().contains("test dialect"));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(MigrateError::Timeout(_))));

        let ok = bounded(None, async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }
}
