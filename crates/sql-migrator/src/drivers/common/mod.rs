//! Catalog row parsing shared by the engine drivers.
//!
//! Each driver's catalog queries alias their output columns to the names
//! below, so one set of parsers turns rows from any engine into schema types:
//!
//! | object   | columns                                                 |
//! |----------|---------------------------------------------------------|
//! | relation | `cstn`, `tn`, `cn`, `rtn`, `rcn`, `ur`, `dr`            |
//! | index    | `key_name`, `tn`, `cn`, `seq`, `non_unique`, `primary`  |
//! | trigger  | `trigger_name`, `tn`, `timing`, `event`, `statement`    |
//! | view     | `view_name`, `view_definition`                          |
//! | sequence | `sequence_name`, `start_value`, `increment_by`          |

#[cfg(feature = "odbc")]
pub mod odbc;

use crate::core::schema::{
    Index, ReferentialAction, Relation, Routine, RoutineKind, Sequence, Trigger, TriggerEvent,
    TriggerTiming, View,
};
use crate::core::statement::{pattern, PatternCell};
use crate::core::value::Record;
use crate::error::{MigrateError, Result};
use std::sync::OnceLock;

/// Parse one foreign key row.
pub fn relation_from_record(row: &Record) -> Result<Relation> {
    let table = row.text("tn");
    let column = row.text("cn");
    if table.is_empty() || column.is_empty() {
        return Err(MigrateError::Introspection(
            "foreign key row without table or column".into(),
        ));
    }
    Ok(Relation {
        name: row.opt_text("cstn"),
        table,
        column,
        parent_table: row.text("rtn"),
        parent_column: row.text("rcn"),
        on_update: ReferentialAction::parse(row.get("ur").unwrap_or_default())?,
        on_delete: ReferentialAction::parse(row.get("dr").unwrap_or_default())?,
    })
}

pub fn relations_from_records(rows: &[Record]) -> Result<Vec<Relation>> {
    rows.iter().map(relation_from_record).collect()
}

/// Fold index rows (one per indexed column) into indexes.
///
/// A row is the primary key index when its `primary` cell is truthy or the
/// index is named `PRIMARY`.
pub fn indexes_from_records(rows: &[Record]) -> Vec<Index> {
    let flat = rows
        .iter()
        .filter(|r| !r.text("key_name").is_empty() && !r.text("cn").is_empty())
        .map(|r| {
            let name = r.text("key_name");
            let primary = r.get_bool("primary") || name.eq_ignore_ascii_case("PRIMARY");
            (
                name,
                r.text("tn"),
                r.text("cn"),
                r.get_i64("seq").unwrap_or(0),
                r.get_bool("non_unique"),
                primary,
            )
        })
        .collect();
    Index::group(flat)
}

pub fn parse_timing(raw: &str) -> Result<TriggerTiming> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "BEFORE" => Ok(TriggerTiming::Before),
        "AFTER" | "" => Ok(TriggerTiming::After),
        "INSTEAD OF" | "INSTEAD_OF" => Ok(TriggerTiming::InsteadOf),
        other => Err(MigrateError::Introspection(format!(
            "Unknown trigger timing: {}",
            other
        ))),
    }
}

pub fn parse_event(raw: &str) -> Result<TriggerEvent> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "INSERT" => Ok(TriggerEvent::Insert),
        "UPDATE" => Ok(TriggerEvent::Update),
        "DELETE" => Ok(TriggerEvent::Delete),
        other => Err(MigrateError::Introspection(format!(
            "Unknown trigger event: {}",
            other
        ))),
    }
}

pub fn trigger_from_record(row: &Record) -> Result<Trigger> {
    Ok(Trigger {
        name: row.text("trigger_name"),
        schema: row.opt_text("trigger_schema"),
        table: row.text("tn"),
        timing: parse_timing(row.get("timing").unwrap_or_default())?,
        event: parse_event(row.get("event").unwrap_or_default())?,
        statement: row.text("statement").trim().to_string(),
    })
}

pub fn triggers_from_records(rows: &[Record]) -> Result<Vec<Trigger>> {
    rows.iter().map(trigger_from_record).collect()
}

pub fn views_from_records(rows: &[Record]) -> Vec<View> {
    rows.iter()
        .filter(|r| !r.text("view_name").is_empty())
        .map(|r| View {
            name: r.text("view_name"),
            schema: r.opt_text("view_schema"),
            definition: r.text("view_definition").trim().to_string(),
        })
        .collect()
}

pub fn sequences_from_records(rows: &[Record]) -> Vec<Sequence> {
    rows.iter()
        .filter(|r| !r.text("sequence_name").is_empty())
        .map(|r| Sequence {
            name: r.text("sequence_name"),
            schema: r.opt_text("sequence_schema"),
            start: r.get_i64("start_value"),
            increment: r.get_i64("increment_by"),
        })
        .collect()
}

/// Routines from `routine_name` / `definition` rows; rows without a
/// definition (no privilege to read it) are skipped.
pub fn routines_from_records(rows: &[Record], kind: RoutineKind) -> Vec<Routine> {
    rows.iter()
        .filter_map(|r| {
            let definition = r.opt_text("definition")?;
            Some(Routine {
                name: r.text("routine_name"),
                schema: r.opt_text("routine_schema"),
                kind,
                definition,
            })
        })
        .collect()
}

fn block_pattern() -> Result<&'static regex::Regex> {
    static CELL: PatternCell = OnceLock::new();
    pattern(&CELL, r"(?is)^\s*begin\b(.*)\bend\s*;?\s*$")
}

/// Trigger body with a `BEGIN ... END` wrapper and trailing `;` removed.
pub fn unwrap_block(body: &str) -> Result<String> {
    let body = body.trim();
    Ok(block_pattern()?
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(body)
        .trim()
        .trim_end_matches(';')
        .trim_end()
        .to_string())
}

fn as_body_pattern() -> Result<&'static regex::Regex> {
    static CELL: PatternCell = OnceLock::new();
    pattern(&CELL, r"(?is)^\s*create\s+.*?\bas\b\s*(.*)$")
}

/// Text after the first `AS` of a stored `CREATE VIEW|TRIGGER` definition.
pub fn definition_body(definition: &str) -> Result<String> {
    Ok(as_body_pattern()?
        .captures(definition)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_end_matches(';').trim_end().to_string())
        .unwrap_or_else(|| definition.trim().to_string()))
}

/// First cell of every row, skipping NULLs.
pub fn first_column(rows: &[Record]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.get_at(0).map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_from_record() {
        let row = Record::from_pairs(&[
            ("cstn", Some("fk_orders_user_id")),
            ("tn", Some("orders")),
            ("cn", Some("user_id")),
            ("rtn", Some("users")),
            ("rcn", Some("id")),
            ("ur", Some("NO ACTION")),
            ("dr", Some("CASCADE")),
        ]);
        let rel = relation_from_record(&row).unwrap();
        assert_eq!(rel.name.as_deref(), Some("fk_orders_user_id"));
        assert_eq!(rel.parent_table, "users");
        assert_eq!(rel.on_update, ReferentialAction::NoAction);
        assert_eq!(rel.on_delete, ReferentialAction::Cascade);
    }

    #[test]
    fn test_relation_without_column_is_rejected() {
        let row = Record::from_pairs(&[("tn", Some("orders")), ("cn", None)]);
        assert!(relation_from_record(&row).is_err());
    }

    #[test]
    fn test_indexes_group_and_detect_primary() {
        let rows = vec![
            Record::from_pairs(&[
                ("key_name", Some("PRIMARY")),
                ("tn", Some("t")),
                ("cn", Some("id")),
                ("seq", Some("1")),
                ("non_unique", Some("0")),
            ]),
            Record::from_pairs(&[
                ("key_name", Some("idx_ab")),
                ("tn", Some("t")),
                ("cn", Some("b")),
                ("seq", Some("2")),
                ("non_unique", Some("1")),
            ]),
            Record::from_pairs(&[
                ("key_name", Some("idx_ab")),
                ("tn", Some("t")),
                ("cn", Some("a")),
                ("seq", Some("1")),
                ("non_unique", Some("1")),
            ]),
        ];
        let indexes = indexes_from_records(&rows);
        assert_eq!(indexes.len(), 2);
        assert!(indexes[0].primary);
        assert!(!indexes[1].primary);
        assert_eq!(indexes[1].column_names(), vec!["a", "b"]);
        assert!(indexes[1].non_unique);
    }

    #[test]
    fn test_trigger_from_record() {
        let row = Record::from_pairs(&[
            ("trigger_name", Some("trg_audit")),
            ("tn", Some("users")),
            ("timing", Some("before")),
            ("event", Some("INSERT")),
            ("statement", Some("  SET NEW.a = 1 ")),
        ]);
        let trigger = trigger_from_record(&row).unwrap();
        assert_eq!(trigger.timing, TriggerTiming::Before);
        assert_eq!(trigger.event, TriggerEvent::Insert);
        assert_eq!(trigger.statement, "SET NEW.a = 1");

        let bad = Record::from_pairs(&[("event", Some("TRUNCATE"))]);
        assert!(trigger_from_record(&bad).is_err());
    }

    #[test]
    fn test_routines_skip_missing_definition() {
        let rows = vec![
            Record::from_pairs(&[("routine_name", Some("f1")), ("definition", Some("CREATE FUNCTION f1() ..."))]),
            Record::from_pairs(&[("routine_name", Some("f2")), ("definition", None)]),
        ];
        let routines = routines_from_records(&rows, RoutineKind::Function);
        assert_eq!(routines.len(), 1);
        assert_eq!(routines[0].name, "f1");
    }

    #[test]
    fn test_unwrap_block() {
        assert_eq!(unwrap_block("BEGIN\n  :NEW.a := 1;\nEND;").unwrap(), ":NEW.a := 1");
        assert_eq!(unwrap_block("SET NEW.a = 1;").unwrap(), "SET NEW.a = 1");
    }

    #[test]
    fn test_definition_body() {
        let view = "CREATE VIEW [dbo].[v] AS SELECT a AS b FROM t";
        assert_eq!(definition_body(view).unwrap(), "SELECT a AS b FROM t");

        let replaced = "create or replace view V1 as select 1 as x;";
        assert_eq!(definition_body(replaced).unwrap(), "select 1 as x");
    }

    #[test]
    fn test_first_column() {
        let rows = vec![
            Record::from_pairs(&[("TABLE_NAME", Some("a"))]),
            Record::from_pairs(&[("TABLE_NAME", None)]),
            Record::from_pairs(&[("TABLE_NAME", Some("b"))]),
        ];
        assert_eq!(first_column(&rows), vec!["a", "b"]);
    }
}
