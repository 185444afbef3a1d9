//! Snowflake SQL dialect (Strategy pattern).
//!
//! Snowflake has no secondary indexes, triggers or managed procedures here;
//! those requests fail with `UnsupportedOperation`.

use crate::core::identifier::{LiteralStyle, QuoteStyle};
use crate::core::statement::Quoting;
use crate::core::traits::{
    AlterColumnStyle, AutoIncrementStyle, AutoUpdateStyle, Dialect, ObjectSupport, PkNaming,
    RenameStyle, SequenceRename, SyntaxTable, TriggerStyle, ViewUpdateStyle,
};

static SNOWFLAKE: SyntaxTable = SyntaxTable {
    name: "snowflake",
    quoting: Quoting::new(QuoteStyle::DoubleQuote, LiteralStyle::Backslash),
    alter_column: AlterColumnStyle::SetDataType,
    auto_increment: AutoIncrementStyle::Keyword("AUTOINCREMENT"),
    auto_update: AutoUpdateStyle::Unsupported,
    rename: RenameStyle::AlterRenameTo,
    view_update: ViewUpdateStyle::CreateOrReplace,
    sequence_rename: SequenceRename::AlterSequence,
    trigger_style: TriggerStyle::RowLevel,
    objects: ObjectSupport {
        indexes: false,
        sequences: true,
        triggers: false,
        views: true,
        routines: false,
    },
    length_suppressed: &[
        "text", "string", "variant", "object", "array", "boolean", "date", "int", "integer",
        "bigint", "smallint", "tinyint", "byteint", "float", "double", "real", "geography",
    ],
    pk_naming: PkNaming::Suffix("_pkey"),
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
    timestamp_type: "timestamp_ntz",
    long_text: ("text", None),
    now: "CURRENT_TIMESTAMP()",
};

/// Snowflake dialect, optionally bound to a schema.
#[derive(Debug, Clone, Default)]
pub struct SnowflakeDialect {
    schema: Option<String>,
}

impl SnowflakeDialect {
    pub fn new(schema: Option<&str>) -> Self {
        Self {
            schema: schema.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }
}

impl Dialect for SnowflakeDialect {
    fn syntax(&self) -> &SyntaxTable {
        &SNOWFLAKE
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}
