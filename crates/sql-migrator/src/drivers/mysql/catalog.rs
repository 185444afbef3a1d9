//! MySQL/MariaDB/TiDB catalog queries and row parsing.
//!
//! Every catalog column is cast to `CHAR` so rows decode as text regardless of
//! the server's collation or integer widths.

use crate::core::schema::{Column, Index};
use crate::core::value::Record;

pub const TABLES: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR(255)) AS tn
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

pub const COLUMNS: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR(255)) AS cn,
        CAST(DATA_TYPE AS CHAR(64)) AS dt,
        CAST(COLUMN_TYPE AS CHAR(4096)) AS ct,
        CAST(CHARACTER_MAXIMUM_LENGTH AS CHAR(32)) AS clen,
        CAST(IS_NULLABLE AS CHAR(3)) AS nullable,
        CAST(COLUMN_KEY AS CHAR(3)) AS ck,
        CAST(EXTRA AS CHAR(255)) AS extra,
        CAST(COLUMN_DEFAULT AS CHAR(4096)) AS cdf,
        CAST(COLUMN_COMMENT AS CHAR(2048)) AS cc,
        CAST(COLLATION_NAME AS CHAR(255)) AS csn,
        CAST(ORDINAL_POSITION AS CHAR(32)) AS cop
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

pub const INDEXES: &str = r#"
    SELECT
        CAST(INDEX_NAME AS CHAR(255)) AS key_name,
        CAST(TABLE_NAME AS CHAR(255)) AS tn,
        CAST(COLUMN_NAME AS CHAR(255)) AS cn,
        CAST(SEQ_IN_INDEX AS CHAR(32)) AS seq,
        CAST(NON_UNIQUE AS CHAR(8)) AS non_unique
    FROM INFORMATION_SCHEMA.STATISTICS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY INDEX_NAME, SEQ_IN_INDEX
"#;

const RELATIONS_BASE: &str = r#"
    SELECT
        CAST(k.CONSTRAINT_NAME AS CHAR(255)) AS cstn,
        CAST(k.TABLE_NAME AS CHAR(255)) AS tn,
        CAST(k.COLUMN_NAME AS CHAR(255)) AS cn,
        CAST(k.REFERENCED_TABLE_NAME AS CHAR(255)) AS rtn,
        CAST(k.REFERENCED_COLUMN_NAME AS CHAR(255)) AS rcn,
        CAST(r.UPDATE_RULE AS CHAR(32)) AS ur,
        CAST(r.DELETE_RULE AS CHAR(32)) AS dr
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
    JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS r
        ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
        AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
        AND r.TABLE_NAME = k.TABLE_NAME
    WHERE k.TABLE_SCHEMA = DATABASE() AND k.REFERENCED_TABLE_NAME IS NOT NULL
"#;

/// Foreign keys of one table (`?` = table name).
pub fn relations_query() -> String {
    format!(
        "{} AND k.TABLE_NAME = ? ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION",
        RELATIONS_BASE
    )
}

/// Foreign keys of every table in the database.
pub fn all_relations_query() -> String {
    format!(
        "{} ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION",
        RELATIONS_BASE
    )
}

pub const TRIGGERS: &str = r#"
    SELECT
        CAST(TRIGGER_NAME AS CHAR(255)) AS trigger_name,
        CAST(EVENT_OBJECT_TABLE AS CHAR(255)) AS tn,
        CAST(ACTION_TIMING AS CHAR(16)) AS timing,
        CAST(EVENT_MANIPULATION AS CHAR(16)) AS event,
        CAST(ACTION_STATEMENT AS CHAR(65535)) AS statement
    FROM INFORMATION_SCHEMA.TRIGGERS
    WHERE TRIGGER_SCHEMA = DATABASE() AND EVENT_OBJECT_TABLE = ?
    ORDER BY TRIGGER_NAME
"#;

pub const VIEWS: &str = r#"
    SELECT
        CAST(TABLE_NAME AS CHAR(255)) AS view_name,
        CAST(VIEW_DEFINITION AS CHAR(65535)) AS view_definition
    FROM INFORMATION_SCHEMA.VIEWS
    WHERE TABLE_SCHEMA = DATABASE()
    ORDER BY TABLE_NAME
"#;

/// Routine names of one kind (`?` = `FUNCTION` or `PROCEDURE`).
pub const ROUTINES: &str = r#"
    SELECT CAST(ROUTINE_NAME AS CHAR(255)) AS routine_name
    FROM INFORMATION_SCHEMA.ROUTINES
    WHERE ROUTINE_SCHEMA = DATABASE() AND ROUTINE_TYPE = ?
    ORDER BY ROUTINE_NAME
"#;

pub const DATABASES: &str = r#"
    SELECT CAST(SCHEMA_NAME AS CHAR(255)) AS name
    FROM INFORMATION_SCHEMA.SCHEMATA
    ORDER BY SCHEMA_NAME
"#;

/// Split the parenthesized part of `COLUMN_TYPE` into precision and scale.
///
/// `decimal(10,2)` gives `("10", "2")`; enum and set member lists are kept
/// whole as the precision.
pub fn type_arguments(data_type: &str, column_type: &str) -> (Option<String>, Option<String>) {
    let (Some(open), Some(close)) = (column_type.find('('), column_type.rfind(')')) else {
        return (None, None);
    };
    if close <= open {
        return (None, None);
    }
    let inner = column_type[open + 1..close].trim();
    if inner.is_empty() {
        return (None, None);
    }
    let dt = data_type.to_ascii_lowercase();
    if dt == "enum" || dt == "set" {
        return (Some(inner.to_string()), None);
    }
    match inner.split_once(',') {
        Some((p, s)) => (Some(p.trim().to_string()), Some(s.trim().to_string())),
        None => (Some(inner.to_string()), None),
    }
}

/// Parse one `INFORMATION_SCHEMA.COLUMNS` row.
pub fn column_from_record(table: &str, row: &Record) -> Column {
    let data_type = row.text("dt");
    let column_type = row.text("ct").to_ascii_lowercase();
    let extra = row.text("extra").to_ascii_lowercase();
    let key = row.text("ck");
    let (precision, scale) = type_arguments(&data_type, &column_type);

    let mut col = Column::new(row.text("cn"), data_type);
    col.table_name = table.to_string();
    col.precision = precision;
    col.scale = scale;
    col.char_length = row.get_i64("clen");
    col.ordinal = row.get_i64("cop").unwrap_or(0);
    col.required = row.text("nullable").eq_ignore_ascii_case("NO");
    col.primary_key = key.eq_ignore_ascii_case("PRI");
    col.unique = key.eq_ignore_ascii_case("UNI");
    col.auto_increment = extra.contains("auto_increment");
    col.unsigned = column_type.contains("unsigned");
    col.auto_update = extra.contains("on update current_timestamp");
    // MariaDB reports an absent default as the literal NULL
    col.default = row
        .get("cdf")
        .filter(|d| !d.eq_ignore_ascii_case("NULL"))
        .map(str::to_string);
    col.comment = row.opt_text("cc");
    col.collation = row.opt_text("csn");
    col
}

pub fn columns_from_records(table: &str, rows: &[Record]) -> Vec<Column> {
    rows.iter().map(|r| column_from_record(table, r)).collect()
}

/// TiDB exposes its hidden row id as an indexed column.
pub fn strip_tidb_rowid(indexes: Vec<Index>) -> Vec<Index> {
    indexes
        .into_iter()
        .filter_map(|mut index| {
            index.columns.retain(|c| c.name != "_tidb_rowid");
            (!index.columns.is_empty()).then_some(index)
        })
        .collect()
}

/// Column holding the definition in `SHOW CREATE FUNCTION|PROCEDURE` output.
pub fn show_create_column(keyword: &str) -> String {
    let mut chars = keyword.to_ascii_lowercase().chars().collect::<Vec<_>>();
    if let Some(first) = chars.first_mut() {
        *first = first.to_ascii_uppercase();
    }
    format!("Create {}", chars.into_iter().collect::<String>())
}
