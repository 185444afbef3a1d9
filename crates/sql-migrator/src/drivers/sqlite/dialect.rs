//! SQLite / libSQL dialect (Strategy pattern).
//!
//! SQLite can rename, add and drop columns but cannot alter one in place, so a
//! definition change becomes rename-to-disposable, add, copy, drop. Primary key
//! and foreign key changes go through a full table rebuild.

use crate::core::identifier::{LiteralStyle, QuoteStyle};
use crate::core::statement::Quoting;
use crate::core::traits::{
    AlterColumnStyle, AutoIncrementStyle, AutoUpdateStyle, Dialect, ObjectSupport, PkNaming,
    RenameStyle, SequenceRename, SyntaxTable, TriggerStyle, ViewUpdateStyle,
};

static SQLITE: SyntaxTable = SyntaxTable {
    name: "sqlite",
    quoting: Quoting::new(QuoteStyle::DoubleQuote, LiteralStyle::Standard),
    alter_column: AlterColumnStyle::Copy,
    auto_increment: AutoIncrementStyle::IntegerRowid,
    auto_update: AutoUpdateStyle::RowTrigger,
    rename: RenameStyle::AlterRenameTo,
    view_update: ViewUpdateStyle::DropCreate,
    sequence_rename: SequenceRename::AlterSequence,
    trigger_style: TriggerStyle::RowLevelBlock,
    objects: ObjectSupport {
        indexes: true,
        sequences: false,
        triggers: true,
        views: true,
        routines: false,
    },
    length_suppressed: &["text", "integer", "blob", "real", "numeric", "boolean", "date", "datetime"],
    pk_naming: PkNaming::Anonymous,
    default_constraints: false,
    null_after_default: true,
    explicit_null: false,
    unsigned: false,
    inline_comments: false,
    drop_index_on_table: false,
    drop_foreign_key: "CONSTRAINT",
    inline_foreign_keys: true,
    fk_on_update: true,
    fk_restrict: true,
    timestamp_type: "datetime",
    long_text: ("text", None),
    now: "CURRENT_TIMESTAMP",
};

static LIBSQL: SyntaxTable = SyntaxTable {
    name: "libsql",
    ..SQLITE
};

/// SQLite-family dialect.
#[derive(Debug, Clone, Copy)]
pub struct SqliteDialect {
    syntax: &'static SyntaxTable,
    select_probe: bool,
}

impl SqliteDialect {
    pub fn new(select_probe: bool) -> Self {
        Self {
            syntax: &SQLITE,
            select_probe,
        }
    }

    pub fn libsql(select_probe: bool) -> Self {
        Self {
            syntax: &LIBSQL,
            select_probe,
        }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Dialect for SqliteDialect {
    fn syntax(&self) -> &SyntaxTable {
        self.syntax
    }

    fn select_probe(&self) -> bool {
        self.select_probe
    }
}
