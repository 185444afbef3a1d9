//! MySQL/MariaDB/TiDB SQL dialect (Strategy pattern).
//!
//! Column edits are folded into a single `ALTER TABLE` with `CHANGE COLUMN`,
//! `ADD COLUMN` and `DROP COLUMN` clauses, and auto-update timestamps use the
//! native `ON UPDATE CURRENT_TIMESTAMP` clause.

use crate::core::identifier::{LiteralStyle, QuoteStyle};
use crate::core::statement::Quoting;
use crate::core::traits::{
    AlterColumnStyle, AutoIncrementStyle, AutoUpdateStyle, Dialect, ObjectSupport, PkNaming,
    RenameStyle, SequenceRename, SyntaxTable, TriggerStyle, ViewUpdateStyle,
};

const fn syntax(name: &'static str) -> SyntaxTable {
    SyntaxTable {
        name,
        quoting: Quoting::new(QuoteStyle::Backtick, LiteralStyle::Backslash),
        alter_column: AlterColumnStyle::Change,
        auto_increment: AutoIncrementStyle::Keyword("auto_increment"),
        auto_update: AutoUpdateStyle::OnUpdateClause,
        rename: RenameStyle::RenameTable,
        view_update: ViewUpdateStyle::CreateOrReplace,
        sequence_rename: SequenceRename::AlterSequence,
        trigger_style: TriggerStyle::RowLevel,
        objects: ObjectSupport {
            indexes: true,
            sequences: false,
            triggers: true,
            views: true,
            routines: true,
        },
        length_suppressed: &[
            "tinytext",
            "text",
            "mediumtext",
            "longtext",
            "tinyblob",
            "blob",
            "mediumblob",
            "longblob",
            "json",
            "date",
            "geometry",
        ],
        pk_naming: PkNaming::Anonymous,
        default_constraints: false,
        null_after_default: false,
        explicit_null: true,
        unsigned: true,
        inline_comments: true,
        drop_index_on_table: true,
        drop_foreign_key: "FOREIGN KEY",
        inline_foreign_keys: false,
        fk_on_update: true,
        fk_restrict: true,
        timestamp_type: "datetime",
        long_text: ("longtext", None),
        now: "CURRENT_TIMESTAMP",
    }
}

static MYSQL: SyntaxTable = syntax("mysql");
static TIDB: SyntaxTable = syntax("tidb");

/// MySQL-family dialect. MariaDB shares the MySQL table; TiDB only differs in name.
#[derive(Debug, Clone, Copy)]
pub struct MysqlDialect {
    syntax: &'static SyntaxTable,
}

impl MysqlDialect {
    pub fn new() -> Self {
        Self { syntax: &MYSQL }
    }

    pub fn tidb() -> Self {
        Self { syntax: &TIDB }
    }
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MysqlDialect {
    fn syntax(&self) -> &SyntaxTable {
        self.syntax
    }
}
