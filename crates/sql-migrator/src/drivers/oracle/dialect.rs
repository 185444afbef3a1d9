//! Oracle SQL dialect (Strategy pattern).
//!
//! Oracle accepts one statement per call and rejects a trailing `;` on plain
//! SQL, while PL/SQL blocks must keep the `;` after `END`.

use crate::core::identifier::{LiteralStyle, QuoteStyle};
use crate::core::statement::{Quoting, Statement};
use crate::core::traits::{
    AlterColumnStyle, AutoIncrementStyle, AutoUpdateStyle, Dialect, ObjectSupport, PkNaming,
    RenameStyle, SequenceRename, SyntaxTable, TriggerStyle, ViewUpdateStyle,
};

static ORACLE: SyntaxTable = SyntaxTable {
    name: "oracle",
    quoting: Quoting::new(QuoteStyle::DoubleQuote, LiteralStyle::Standard),
    alter_column: AlterColumnStyle::Modify,
    auto_increment: AutoIncrementStyle::Keyword("GENERATED BY DEFAULT ON NULL AS IDENTITY"),
    auto_update: AutoUpdateStyle::BeforeRowTrigger,
    rename: RenameStyle::AlterRenameTo,
    view_update: ViewUpdateStyle::CreateOrReplace,
    sequence_rename: SequenceRename::Rename,
    trigger_style: TriggerStyle::RowLevelBlock,
    objects: ObjectSupport {
        indexes: true,
        sequences: true,
        triggers: true,
        views: true,
        routines: true,
    },
    length_suppressed: &[
        "clob", "nclob", "blob", "date", "long", "int", "integer", "smallint", "bfile",
        "binary_float", "binary_double",
    ],
    pk_naming: PkNaming::Anonymous,
    default_constraints: false,
    null_after_default: true,
    explicit_null: true,
    unsigned: false,
    inline_comments: false,
    drop_index_on_table: false,
    drop_foreign_key: "CONSTRAINT",
    inline_foreign_keys: false,
    fk_on_update: false,
    fk_restrict: false,
    timestamp_type: "timestamp",
    long_text: ("clob", None),
    now: "SYSTIMESTAMP",
};

/// Oracle dialect, optionally bound to a schema (user).
#[derive(Debug, Clone, Default)]
pub struct OracleDialect {
    schema: Option<String>,
}

impl OracleDialect {
    pub fn new(schema: Option<&str>) -> Self {
        Self {
            schema: schema.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }
}

impl Dialect for OracleDialect {
    fn syntax(&self) -> &SyntaxTable {
        &ORACLE
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn finalize(&self, statement: &Statement) -> String {
        let sql = statement.sql().trim_end();
        let cut = sql.len().saturating_sub(3);
        let ends_with_end = sql.is_char_boundary(cut) && sql[cut..].eq_ignore_ascii_case("end");
        if ends_with_end {
            format!("{};", sql)
        } else {
            sql.to_string()
        }
    }
}
