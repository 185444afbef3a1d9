//! SQL Server T-SQL dialect (Strategy pattern).
//!
//! Names are bracket-quoted and resolved inside a schema (default `dbo`).
//! Column defaults are named `DF_<table>_<column>` constraints, and renames go
//! through `sp_rename`.

use crate::core::identifier::{LiteralStyle, QuoteStyle};
use crate::core::statement::Quoting;
use crate::core::traits::{
    AlterColumnStyle, AutoIncrementStyle, AutoUpdateStyle, Dialect, ObjectSupport, PkNaming,
    RenameStyle, SequenceRename, SyntaxTable, TriggerStyle, ViewUpdateStyle,
};

/// Schema used when the connection does not name one.
pub const DEFAULT_SCHEMA: &str = "dbo";

static MSSQL: SyntaxTable = SyntaxTable {
    name: "mssql",
    quoting: Quoting::new(QuoteStyle::Bracket, LiteralStyle::Standard),
    alter_column: AlterColumnStyle::AlterColumn,
    auto_increment: AutoIncrementStyle::Keyword("IDENTITY(1,1)"),
    auto_update: AutoUpdateStyle::InsertedTrigger,
    rename: RenameStyle::SpRename,
    view_update: ViewUpdateStyle::Alter,
    sequence_rename: SequenceRename::SpRename,
    trigger_style: TriggerStyle::StatementLevel,
    objects: ObjectSupport {
        indexes: true,
        sequences: true,
        triggers: true,
        views: true,
        routines: true,
    },
    length_suppressed: &[
        "int",
        "bigint",
        "smallint",
        "tinyint",
        "bit",
        "date",
        "datetime",
        "smalldatetime",
        "money",
        "smallmoney",
        "text",
        "ntext",
        "image",
        "xml",
        "uniqueidentifier",
        "real",
        "sql_variant",
        "hierarchyid",
        "geometry",
        "geography",
    ],
    pk_naming: PkNaming::Prefix("PK_"),
    default_constraints: true,
    null_after_default: false,
    explicit_null: true,
    unsigned: false,
    inline_comments: false,
    drop_index_on_table: true,
    drop_foreign_key: "CONSTRAINT",
    inline_foreign_keys: false,
    fk_on_update: true,
    fk_restrict: false,
    timestamp_type: "datetime2",
    long_text: ("nvarchar", Some("max")),
    now: "GETDATE()",
};

/// SQL Server dialect bound to a schema.
#[derive(Debug, Clone)]
pub struct MssqlDialect {
    schema: String,
}

impl MssqlDialect {
    pub fn new(schema: Option<&str>) -> Self {
        Self {
            schema: schema
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SCHEMA)
                .to_string(),
        }
    }
}

impl Default for MssqlDialect {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Dialect for MssqlDialect {
    fn syntax(&self) -> &SyntaxTable {
        &MSSQL
    }

    fn schema(&self) -> Option<&str> {
        Some(&self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_is_dbo() {
        assert_eq!(MssqlDialect::default().schema(), Some("dbo"));
        assert_eq!(MssqlDialect::new(Some("")).schema(), Some("dbo"));
        assert_eq!(MssqlDialect::new(Some("sales")).schema(), Some("sales"));
    }

    #[test]
    fn test_bracket_quoting() {
        let d = MssqlDialect::default();
        assert_eq!(d.quoting().ident("my]col").unwrap(), "[my]]col]");
        assert!(d.syntax().suppresses_length("INT"));
    }
}
