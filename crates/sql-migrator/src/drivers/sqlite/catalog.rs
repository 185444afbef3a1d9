//! SQLite catalog queries and row parsing.
//!
//! Table-scoped queries use the `pragma_*` table-valued functions and take the
//! table name as `?1`.

use std::sync::OnceLock;

use crate::core::schema::{Column, Trigger};
use crate::core::statement::{pattern, PatternCell};
use crate::core::value::Record;
use crate::drivers::common;
use crate::error::{MigrateError, Result};

pub const TABLES: &str = "SELECT name AS tn FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// Bookkeeping tables libSQL and Litestream keep next to user tables.
pub const LIBSQL_TABLES: &str = "SELECT name AS tn FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
     AND name NOT LIKE 'libsql_%' AND name NOT LIKE '_litestream%' ORDER BY name";

pub const COLUMNS: &str = r#"
    SELECT
        p.name AS cn,
        p.type AS ct,
        p."notnull" AS rqd,
        p.dflt_value AS cdf,
        p.pk AS pk,
        p.cid + 1 AS cop,
        EXISTS (
            SELECT 1 FROM sqlite_master m
            WHERE m.type = 'trigger' AND m.name = 'xc_trigger_' || ?1 || '_' || p.name
        ) AS au
    FROM pragma_table_info(?1) p
    ORDER BY p.cid
"#;

pub const INDEXES: &str = r#"
    SELECT
        il.name AS key_name,
        ?1 AS tn,
        ii.name AS cn,
        ii.seqno + 1 AS seq,
        CASE WHEN il."unique" = 1 THEN 0 ELSE 1 END AS non_unique,
        CASE WHEN il.origin = 'pk' THEN 1 ELSE 0 END AS "primary"
    FROM pragma_index_list(?1) il
    JOIN pragma_index_info(il.name) ii
    ORDER BY il.name, ii.seqno
"#;

pub const RELATIONS: &str = r#"
    SELECT
        NULL AS cstn,
        ?1 AS tn,
        f."from" AS cn,
        f."table" AS rtn,
        f."to" AS rcn,
        f.on_update AS ur,
        f.on_delete AS dr
    FROM pragma_foreign_key_list(?1) f
    ORDER BY f.id, f.seq
"#;

/// User triggers; auto-update triggers are managed with their columns.
pub const TRIGGERS: &str = "SELECT name AS trigger_name, tbl_name AS tn, sql AS definition \
     FROM sqlite_master WHERE type = 'trigger' AND tbl_name = ?1 \
     AND name NOT LIKE 'xc_trigger_%' ORDER BY name";

pub const VIEWS: &str = "SELECT name AS view_name, sql AS view_definition \
     FROM sqlite_master WHERE type = 'view' ORDER BY name";

pub const VERSION: &str = "SELECT sqlite_version() AS version";

/// Split a declared type such as `decimal(10, 2)` into type, precision and scale.
pub fn split_type(declared: &str) -> (String, Option<String>, Option<String>) {
    let declared = declared.trim();
    let Some(open) = declared.find('(') else {
        return (declared.to_string(), None, None);
    };
    let base = declared[..open].trim().to_string();
    let args = declared[open + 1..].trim_end().trim_end_matches(')');
    let mut parts = args.splitn(2, ',').map(|p| p.trim().to_string());
    let precision = parts.next().filter(|p| !p.is_empty());
    let scale = parts.next().filter(|s| !s.is_empty());
    (base, precision, scale)
}

/// Columns of one table. A sole `integer` key aliases the rowid and counts as
/// auto-increment.
pub fn columns_from_records(table: &str, rows: &[Record]) -> Vec<Column> {
    let key_count = rows.iter().filter(|r| r.get_i64("pk").unwrap_or(0) > 0).count();
    rows.iter()
        .map(|row| {
            let (data_type, precision, scale) = split_type(&row.text("ct"));
            let mut col = Column::new(row.text("cn"), data_type);
            col.table_name = table.to_string();
            col.precision = precision;
            col.scale = scale;
            col.ordinal = row.get_i64("cop").unwrap_or(0);
            col.required = row.get_bool("rqd");
            col.primary_key = row.get_i64("pk").unwrap_or(0) > 0;
            col.auto_increment =
                col.primary_key && key_count == 1 && col.data_type.eq_ignore_ascii_case("integer");
            if col.primary_key {
                col.required = true;
            }
            col.default = row.opt_text("cdf");
            col.auto_update = row.get_bool("au");
            col
        })
        .collect()
}

fn trigger_pattern() -> Result<&'static regex::Regex> {
    static CELL: PatternCell = OnceLock::new();
    pattern(
        &CELL,
        r"(?is)^\s*create\s+(?:temp(?:orary)?\s+)?trigger\s+(?:if\s+not\s+exists\s+)?.*?\b(before|after|instead\s+of)?\s*(insert|update|delete)\b.*?\bbegin\b",
    )
}

/// Parse a stored `CREATE TRIGGER` statement.
pub fn trigger_from_record(row: &Record) -> Result<Trigger> {
    let definition = row.text("definition");
    let caps = trigger_pattern()?.captures(&definition).ok_or_else(|| {
        MigrateError::Introspection(format!(
            "Unrecognized trigger definition for {}",
            row.text("trigger_name")
        ))
    })?;
    let timing = caps.get(1).map(|m| m.as_str()).unwrap_or("BEFORE");
    let event = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let body_start = caps.get(0).map(|m| m.end()).unwrap_or_default();
    let block = format!("BEGIN {}", &definition[body_start..]);

    Ok(Trigger {
        name: row.text("trigger_name"),
        schema: None,
        table: row.text("tn"),
        // SQLite's default timing is BEFORE
        timing: common::parse_timing(&timing.split_whitespace().collect::<Vec<_>>().join(" "))?,
        event: common::parse_event(event)?,
        statement: common::unwrap_block(&block)?,
    })
}

pub fn triggers_from_records(rows: &[Record]) -> Result<Vec<Trigger>> {
    rows.iter().map(trigger_from_record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{TriggerEvent, TriggerTiming};

    #[test]
    fn test_split_type() {
        assert_eq!(split_type("varchar(255)"), ("varchar".into(), Some("255".into()), None));
        assert_eq!(
            split_type("DECIMAL(10, 2)"),
            ("DECIMAL".into(), Some("10".into()), Some("2".into()))
        );
        assert_eq!(split_type("text"), ("text".into(), None, None));
    }

    #[test]
    fn test_integer_key_is_rowid_alias() {
        let rows = vec![
            Record::from_pairs(&[
                ("cn", Some("id")),
                ("ct", Some("INTEGER")),
                ("rqd", Some("0")),
                ("pk", Some("1")),
                ("cop", Some("1")),
                ("au", Some("0")),
            ]),
            Record::from_pairs(&[
                ("cn", Some("updated_at")),
                ("ct", Some("datetime")),
                ("rqd", Some("0")),
                ("cdf", Some("CURRENT_TIMESTAMP")),
                ("pk", Some("0")),
                ("cop", Some("2")),
                ("au", Some("1")),
            ]),
        ];
        let cols = columns_from_records("t", &rows);
        assert!(cols[0].auto_increment && cols[0].required);
        assert!(cols[1].auto_update);
        assert_eq!(cols[1].default.as_deref(), Some("CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_composite_integer_key_is_not_auto_increment() {
        let rows = vec![
            Record::from_pairs(&[("cn", Some("a")), ("ct", Some("integer")), ("pk", Some("1"))]),
            Record::from_pairs(&[("cn", Some("b")), ("ct", Some("integer")), ("pk", Some("2"))]),
        ];
        let cols = columns_from_records("t", &rows);
        assert!(cols.iter().all(|c| c.primary_key && !c.auto_increment));
    }

    #[test]
    fn test_trigger_from_record() {
        let row = Record::from_pairs(&[
            ("trigger_name", Some("trg_log")),
            ("tn", Some("users")),
            (
                "definition",
                Some("CREATE TRIGGER \"trg_log\" AFTER INSERT ON \"users\" FOR EACH ROW BEGIN INSERT INTO log VALUES (new.id); END"),
            ),
        ]);
        let trigger = trigger_from_record(&row).unwrap();
        assert_eq!(trigger.timing, TriggerTiming::After);
        assert_eq!(trigger.event, TriggerEvent::Insert);
        assert_eq!(trigger.statement, "INSERT INTO log VALUES (new.id)");
    }
}
