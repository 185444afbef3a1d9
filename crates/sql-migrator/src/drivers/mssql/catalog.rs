//! SQL Server catalog queries and row parsing.
//!
//! Queries take the schema as `@P1` and, where scoped to a table, the table
//! name as `@P2`. Every column is cast to `NVARCHAR` so rows decode as text.

use crate::core::schema::Column;
use crate::core::value::Record;
use crate::drivers::common;
use crate::error::Result;

pub const TABLES: &str = r#"
    SELECT CAST(TABLE_NAME AS NVARCHAR(256)) AS tn
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = @P1 AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

pub const SCHEMAS: &str = r#"
    SELECT CAST(name AS NVARCHAR(256)) AS name
    FROM sys.schemas
    WHERE schema_id < 16384 AND name NOT IN ('sys', 'INFORMATION_SCHEMA', 'guest')
    ORDER BY name
"#;

pub const COLUMNS: &str = r#"
    SELECT
        CAST(c.COLUMN_NAME AS NVARCHAR(256)) AS cn,
        CAST(c.DATA_TYPE AS NVARCHAR(128)) AS dt,
        CAST(c.CHARACTER_MAXIMUM_LENGTH AS NVARCHAR(32)) AS clen,
        CAST(c.NUMERIC_PRECISION AS NVARCHAR(32)) AS np,
        CAST(c.NUMERIC_SCALE AS NVARCHAR(32)) AS ns,
        CAST(c.DATETIME_PRECISION AS NVARCHAR(32)) AS dp,
        CAST(c.IS_NULLABLE AS NVARCHAR(3)) AS nullable,
        CAST(c.COLUMN_DEFAULT AS NVARCHAR(4000)) AS cdf,
        CAST(c.COLLATION_NAME AS NVARCHAR(256)) AS csn,
        CAST(c.ORDINAL_POSITION AS NVARCHAR(32)) AS cop,
        CAST(COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)),
            c.COLUMN_NAME, 'IsIdentity') AS NVARCHAR(8)) AS ai,
        CAST(CASE WHEN pk.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS NVARCHAR(8)) AS pk,
        CAST(CASE WHEN EXISTS (
            SELECT 1 FROM sys.triggers tr
            WHERE tr.name = 'xc_trigger_' + c.TABLE_NAME + '_' + c.COLUMN_NAME
        ) THEN 1 ELSE 0 END AS NVARCHAR(8)) AS au,
        CAST(dc.name AS NVARCHAR(256)) AS default_constraint
    FROM INFORMATION_SCHEMA.COLUMNS c
    LEFT JOIN (
        SELECT ku.TABLE_SCHEMA, ku.TABLE_NAME, ku.COLUMN_NAME
        FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
            ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME AND tc.TABLE_SCHEMA = ku.TABLE_SCHEMA
        WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
    ) pk ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA AND pk.TABLE_NAME = c.TABLE_NAME
        AND pk.COLUMN_NAME = c.COLUMN_NAME
    LEFT JOIN sys.default_constraints dc
        ON dc.parent_object_id = OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME))
        AND dc.parent_column_id = COLUMNPROPERTY(
            OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), c.COLUMN_NAME, 'ColumnId')
    WHERE c.TABLE_SCHEMA = @P1 AND c.TABLE_NAME = @P2
    ORDER BY c.ORDINAL_POSITION
"#;

pub const INDEXES: &str = r#"
    SELECT
        CAST(i.name AS NVARCHAR(256)) AS key_name,
        CAST(t.name AS NVARCHAR(256)) AS tn,
        CAST(c.name AS NVARCHAR(256)) AS cn,
        CAST(ic.key_ordinal AS NVARCHAR(32)) AS seq,
        CAST(CASE WHEN i.is_unique = 1 THEN 0 ELSE 1 END AS NVARCHAR(8)) AS non_unique,
        CAST(i.is_primary_key AS NVARCHAR(8)) AS [primary]
    FROM sys.indexes i
    JOIN sys.tables t ON t.object_id = i.object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    WHERE s.name = @P1 AND t.name = @P2 AND i.name IS NOT NULL AND ic.is_included_column = 0
    ORDER BY i.name, ic.key_ordinal
"#;

const RELATIONS_BASE: &str = r#"
    SELECT
        CAST(fk.name AS NVARCHAR(256)) AS cstn,
        CAST(tp.name AS NVARCHAR(256)) AS tn,
        CAST(cp.name AS NVARCHAR(256)) AS cn,
        CAST(tr.name AS NVARCHAR(256)) AS rtn,
        CAST(cr.name AS NVARCHAR(256)) AS rcn,
        CAST(fk.update_referential_action_desc AS NVARCHAR(32)) AS ur,
        CAST(fk.delete_referential_action_desc AS NVARCHAR(32)) AS dr
    FROM sys.foreign_keys fk
    JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
    JOIN sys.tables tp ON tp.object_id = fkc.parent_object_id
    JOIN sys.schemas s ON s.schema_id = tp.schema_id
    JOIN sys.columns cp ON cp.object_id = fkc.parent_object_id AND cp.column_id = fkc.parent_column_id
    JOIN sys.tables tr ON tr.object_id = fkc.referenced_object_id
    JOIN sys.columns cr ON cr.object_id = fkc.referenced_object_id AND cr.column_id = fkc.referenced_column_id
    WHERE s.name = @P1
"#;

pub fn relations_query() -> String {
    format!("{} AND tp.name = @P2 ORDER BY fk.name, fkc.constraint_column_id", RELATIONS_BASE)
}

pub fn all_relations_query() -> String {
    format!("{} ORDER BY tp.name, fk.name, fkc.constraint_column_id", RELATIONS_BASE)
}

pub const TRIGGERS: &str = r#"
    SELECT
        CAST(tr.name AS NVARCHAR(256)) AS trigger_name,
        CAST(t.name AS NVARCHAR(256)) AS tn,
        CAST(CASE WHEN tr.is_instead_of_trigger = 1 THEN 'INSTEAD OF' ELSE 'AFTER' END AS NVARCHAR(16)) AS timing,
        CAST(te.type_desc AS NVARCHAR(16)) AS event,
        CAST(OBJECT_DEFINITION(tr.object_id) AS NVARCHAR(MAX)) AS statement
    FROM sys.triggers tr
    JOIN sys.tables t ON t.object_id = tr.parent_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    JOIN sys.trigger_events te ON te.object_id = tr.object_id
    WHERE s.name = @P1 AND t.name = @P2
    ORDER BY tr.name
"#;

pub const VIEWS: &str = r#"
    SELECT
        CAST(v.name AS NVARCHAR(256)) AS view_name,
        CAST(OBJECT_DEFINITION(v.object_id) AS NVARCHAR(MAX)) AS view_definition
    FROM sys.views v
    JOIN sys.schemas s ON s.schema_id = v.schema_id
    WHERE s.name = @P1
    ORDER BY v.name
"#;

pub const FUNCTIONS: &str = r#"
    SELECT
        CAST(o.name AS NVARCHAR(256)) AS routine_name,
        CAST(OBJECT_DEFINITION(o.object_id) AS NVARCHAR(MAX)) AS definition
    FROM sys.objects o
    JOIN sys.schemas s ON s.schema_id = o.schema_id
    WHERE s.name = @P1 AND o.type IN ('FN', 'IF', 'TF')
    ORDER BY o.name
"#;

pub const PROCEDURES: &str = r#"
    SELECT
        CAST(o.name AS NVARCHAR(256)) AS routine_name,
        CAST(OBJECT_DEFINITION(o.object_id) AS NVARCHAR(MAX)) AS definition
    FROM sys.objects o
    JOIN sys.schemas s ON s.schema_id = o.schema_id
    WHERE s.name = @P1 AND o.type = 'P'
    ORDER BY o.name
"#;

pub const SEQUENCES: &str = r#"
    SELECT
        CAST(q.name AS NVARCHAR(256)) AS sequence_name,
        CAST(q.start_value AS NVARCHAR(64)) AS start_value,
        CAST(q.increment AS NVARCHAR(64)) AS increment_by
    FROM sys.sequences q
    JOIN sys.schemas s ON s.schema_id = q.schema_id
    WHERE s.name = @P1
    ORDER BY q.name
"#;

pub const PK_CONSTRAINT: &str = r#"
    SELECT CAST(kc.name AS NVARCHAR(256)) AS name
    FROM sys.key_constraints kc
    WHERE kc.type = 'PK'
        AND kc.parent_object_id = OBJECT_ID(QUOTENAME(@P1) + '.' + QUOTENAME(@P2))
"#;

pub const VERSION: &str =
    "SELECT CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(128)) AS version";

pub const DATABASES: &str = r#"
    SELECT CAST(name AS NVARCHAR(256)) AS name FROM sys.databases ORDER BY name
"#;

/// Strip the parentheses SQL Server wraps around stored defaults:
/// `((0))` becomes `0`, `(getdate())` becomes `getdate()`.
pub fn strip_default_parens(raw: &str) -> String {
    let mut value = raw.trim();
    while value.starts_with('(') && value.ends_with(')') && wraps_whole(value) {
        value = value[1..value.len() - 1].trim();
    }
    value.to_string()
}

/// True when the opening parenthesis at 0 closes at the last character.
fn wraps_whole(value: &str) -> bool {
    let mut depth = 0i32;
    let last = value.len() - 1;
    for (i, ch) in value.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == last;
                }
            }
            _ => {}
        }
    }
    false
}

/// Parse one `INFORMATION_SCHEMA.COLUMNS` row.
pub fn column_from_record(table: &str, row: &Record) -> Column {
    let data_type = row.text("dt");
    let dt = data_type.to_ascii_lowercase();

    let (precision, scale) = match row.get_i64("clen") {
        Some(-1) => (Some("max".to_string()), None),
        Some(len) if len > 0 && !matches!(dt.as_str(), "text" | "ntext" | "image" | "xml") => {
            (Some(len.to_string()), None)
        }
        _ => match dt.as_str() {
            "decimal" | "numeric" => (row.opt_text("np"), row.opt_text("ns")),
            "datetime2" | "datetimeoffset" | "time" => (row.opt_text("dp"), None),
            _ => (None, None),
        },
    };

    let mut col = Column::new(row.text("cn"), data_type);
    col.table_name = table.to_string();
    col.precision = precision;
    col.scale = scale;
    col.char_length = row.get_i64("clen");
    col.ordinal = row.get_i64("cop").unwrap_or(0);
    col.required = row.text("nullable").eq_ignore_ascii_case("NO");
    col.primary_key = row.get_bool("pk");
    col.auto_increment = row.get_bool("ai");
    col.auto_update = row.get_bool("au");
    col.default = row.opt_text("cdf").map(|d| strip_default_parens(&d));
    col.collation = row.opt_text("csn");
    col.default_constraint = row.opt_text("default_constraint");
    col
}

pub fn columns_from_records(table: &str, rows: &[Record]) -> Vec<Column> {
    rows.iter().map(|r| column_from_record(table, r)).collect()
}

/// Trigger body with the `BEGIN ... END` wrapper removed.
pub fn trigger_body(definition: &str) -> Result<String> {
    common::unwrap_block(&common::definition_body(definition)?)
}
