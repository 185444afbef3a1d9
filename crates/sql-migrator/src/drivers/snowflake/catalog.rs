//! Snowflake catalog queries and row parsing.
//!
//! Table-scoped metadata comes from `INFORMATION_SCHEMA`; key constraints
//! come from `SHOW PRIMARY KEYS` / `SHOW IMPORTED KEYS`, whose result
//! columns are renamed here to the shared aliases.

use crate::core::schema::Column;
use crate::core::value::Record;

pub fn tables(schema: &str) -> String {
    format!(
        "SELECT TABLE_NAME AS tn FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
        schema
    )
}

pub const SCHEMAS: &str = "SELECT SCHEMA_NAME AS name FROM INFORMATION_SCHEMA.SCHEMATA \
     WHERE SCHEMA_NAME <> 'INFORMATION_SCHEMA' ORDER BY SCHEMA_NAME";

pub fn columns(schema: &str, table: &str) -> String {
    format!(
        r#"
        SELECT
            COLUMN_NAME AS cn,
            DATA_TYPE AS dt,
            TO_VARCHAR(CHARACTER_MAXIMUM_LENGTH) AS clen,
            TO_VARCHAR(NUMERIC_PRECISION) AS np,
            TO_VARCHAR(NUMERIC_SCALE) AS ns,
            IS_NULLABLE AS nullable,
            COLUMN_DEFAULT AS cdf,
            TO_VARCHAR(ORDINAL_POSITION) AS cop,
            IFF(IS_IDENTITY = 'YES', '1', '0') AS ai,
            COMMENT AS cc,
            COLLATION_NAME AS csn
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = {schema} AND TABLE_NAME = {table}
        ORDER BY ORDINAL_POSITION
        "#,
        schema = schema,
        table = table
    )
}

/// `SHOW` commands take a qualified identifier, not a literal.
pub fn primary_keys(qualified_table: &str) -> String {
    format!("SHOW PRIMARY KEYS IN TABLE {}", qualified_table)
}

pub fn imported_keys(scope: &str) -> String {
    format!("SHOW IMPORTED KEYS IN {}", scope)
}

pub fn views(schema: &str) -> String {
    format!(
        "SELECT TABLE_NAME AS view_name, VIEW_DEFINITION AS view_definition \
         FROM INFORMATION_SCHEMA.VIEWS WHERE TABLE_SCHEMA = {} ORDER BY TABLE_NAME",
        schema
    )
}

pub fn sequences(schema: &str) -> String {
    format!(
        "SELECT SEQUENCE_NAME AS sequence_name, TO_VARCHAR(START_VALUE) AS start_value, \
         TO_VARCHAR(INCREMENT) AS increment_by \
         FROM INFORMATION_SCHEMA.SEQUENCES WHERE SEQUENCE_SCHEMA = {} ORDER BY SEQUENCE_NAME",
        schema
    )
}

pub const VERSION: &str = "SELECT CURRENT_VERSION() AS version";

/// Rename `SHOW IMPORTED KEYS` output to the shared relation aliases.
pub fn relation_record(row: &Record) -> Record {
    Record::from_pairs(&[
        ("cstn", row.get("fk_name")),
        ("tn", row.get("fk_table_name")),
        ("cn", row.get("fk_column_name")),
        ("rtn", row.get("pk_table_name")),
        ("rcn", row.get("pk_column_name")),
        ("ur", row.get("update_rule")),
        ("dr", row.get("delete_rule")),
    ])
}

/// Column names listed by `SHOW PRIMARY KEYS`.
pub fn primary_key_columns(rows: &[Record]) -> Vec<String> {
    rows.iter().map(|r| r.text("column_name")).collect()
}

pub fn column_from_record(table: &str, row: &Record) -> Column {
    let data_type = row.text("dt");
    let dt = data_type.to_ascii_lowercase();

    let (precision, scale) = match dt.as_str() {
        "number" | "decimal" | "numeric" => (row.opt_text("np"), row.opt_text("ns")),
        "text" | "varchar" | "char" | "binary" => (
            row.get_i64("clen")
                // 16 MB is the implicit maximum
                .filter(|l| *l > 0 && *l < 16_777_216)
                .map(|l| l.to_string()),
            None,
        ),
        _ => (None, None),
    };

    let mut col = Column::new(row.text("cn"), data_type);
    col.table_name = table.to_string();
    col.precision = precision;
    col.scale = scale;
    col.char_length = row.get_i64("clen");
    col.ordinal = row.get_i64("cop").unwrap_or(0);
    col.required = row.text("nullable").eq_ignore_ascii_case("NO");
    col.auto_increment = row.get_bool("ai");
    col.default = if col.auto_increment {
        None
    } else {
        row.opt_text("cdf")
    };
    col.comment = row.opt_text("cc");
    col.collation = row.opt_text("csn");
    col
}

/// Columns with primary key flags taken from `pk_columns`.
pub fn columns_from_records(table: &str, rows: &[Record], pk_columns: &[String]) -> Vec<Column> {
    rows.iter()
        .map(|r| {
            let mut col = column_from_record(table, r);
            col.primary_key = pk_columns.iter().any(|pk| *pk == col.name);
            col
        })
        .collect()
}
