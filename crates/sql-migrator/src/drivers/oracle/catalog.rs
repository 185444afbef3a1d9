//! Oracle catalog queries and row parsing.
//!
//! Queries are rendered with the owner and table embedded as quoted literals
//! because statements run over ODBC without bound parameters. The owner is
//! either a configured schema or the session's current schema.

use crate::core::schema::Column;
use crate::core::statement::Quoting;
use crate::core::value::Record;

/// Owner expression for catalog predicates.
pub fn owner(quoting: Quoting, schema: Option<&str>) -> String {
    match schema {
        Some(s) => quoting.value(&s.to_uppercase()),
        None => "SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA')".to_string(),
    }
}

pub fn tables(owner: &str) -> String {
    format!(
        "SELECT table_name AS tn FROM all_tables \
         WHERE owner = {} AND nested = 'NO' AND secondary = 'N' \
         AND table_name NOT LIKE 'BIN$%' ORDER BY table_name",
        owner
    )
}

pub const SCHEMAS: &str = "SELECT username AS name FROM all_users \
     WHERE oracle_maintained = 'N' ORDER BY username";

pub fn columns(owner: &str, table: &str) -> String {
    format!(
        r#"
        SELECT
            c.column_name AS cn,
            c.data_type AS dt,
            TO_CHAR(c.char_length) AS clen,
            TO_CHAR(c.data_precision) AS np,
            TO_CHAR(c.data_scale) AS ns,
            c.nullable AS nullable,
            c.data_default AS cdf,
            TO_CHAR(c.column_id) AS cop,
            CASE WHEN c.identity_column = 'YES' OR EXISTS (
                SELECT 1 FROM all_trigger_cols tc
                JOIN all_dependencies dep
                    ON dep.owner = tc.trigger_owner AND dep.name = tc.trigger_name
                    AND dep.type = 'TRIGGER' AND dep.referenced_type = 'SEQUENCE'
                JOIN all_constraints k
                    ON k.owner = tc.table_owner AND k.table_name = tc.table_name
                    AND k.constraint_type = 'P'
                JOIN all_cons_columns kc
                    ON kc.owner = k.owner AND kc.constraint_name = k.constraint_name
                    AND kc.column_name = tc.column_name
                WHERE tc.table_owner = c.owner AND tc.table_name = c.table_name
                    AND tc.column_name = c.column_name
            ) THEN '1' ELSE '0' END AS ai,
            CASE WHEN EXISTS (
                SELECT 1 FROM all_constraints k
                JOIN all_cons_columns kc
                    ON kc.owner = k.owner AND kc.constraint_name = k.constraint_name
                WHERE k.constraint_type = 'P' AND k.owner = c.owner
                    AND k.table_name = c.table_name AND kc.column_name = c.column_name
            ) THEN '1' ELSE '0' END AS pk,
            CASE WHEN EXISTS (
                SELECT 1 FROM all_triggers tr
                WHERE tr.owner = c.owner
                    AND UPPER(tr.trigger_name) = UPPER('xc_trigger_' || c.table_name || '_' || c.column_name)
            ) THEN '1' ELSE '0' END AS au,
            cm.comments AS cc
        FROM all_tab_columns c
        LEFT JOIN all_col_comments cm
            ON cm.owner = c.owner AND cm.table_name = c.table_name
            AND cm.column_name = c.column_name
        WHERE c.owner = {owner} AND c.table_name = {table}
        ORDER BY c.column_id
        "#,
        owner = owner,
        table = table
    )
}

pub fn indexes(owner: &str, table: &str) -> String {
    format!(
        r#"
        SELECT
            i.index_name AS key_name,
            i.table_name AS tn,
            ic.column_name AS cn,
            TO_CHAR(ic.column_position) AS seq,
            CASE WHEN i.uniqueness = 'UNIQUE' THEN '0' ELSE '1' END AS non_unique,
            CASE WHEN EXISTS (
                SELECT 1 FROM all_constraints k
                WHERE k.owner = i.table_owner AND k.table_name = i.table_name
                    AND k.constraint_type = 'P' AND k.index_name = i.index_name
            ) THEN '1' ELSE '0' END AS primary
        FROM all_indexes i
        JOIN all_ind_columns ic
            ON ic.index_owner = i.owner AND ic.index_name = i.index_name
        WHERE i.table_owner = {owner} AND i.table_name = {table}
            AND i.index_type NOT IN ('LOB', 'DOMAIN')
        ORDER BY i.index_name, ic.column_position
        "#,
        owner = owner,
        table = table
    )
}

/// Foreign keys, optionally restricted to one child table.
pub fn relations(owner: &str, table: Option<&str>) -> String {
    let filter = table
        .map(|t| format!(" AND c.table_name = {}", t))
        .unwrap_or_default();
    format!(
        r#"
        SELECT
            c.constraint_name AS cstn,
            c.table_name AS tn,
            cc.column_name AS cn,
            p.table_name AS rtn,
            pc.column_name AS rcn,
            'NO ACTION' AS ur,
            c.delete_rule AS dr
        FROM all_constraints c
        JOIN all_cons_columns cc
            ON cc.owner = c.owner AND cc.constraint_name = c.constraint_name
        JOIN all_constraints p
            ON p.owner = c.r_owner AND p.constraint_name = c.r_constraint_name
        JOIN all_cons_columns pc
            ON pc.owner = p.owner AND pc.constraint_name = p.constraint_name
            AND pc.position = cc.position
        WHERE c.constraint_type = 'R' AND c.owner = {owner}{filter}
        ORDER BY c.table_name, c.constraint_name, cc.position
        "#,
        owner = owner,
        filter = filter
    )
}

pub fn triggers(owner: &str, table: &str) -> String {
    format!(
        r#"
        SELECT
            trigger_name AS trigger_name,
            table_name AS tn,
            CASE
                WHEN trigger_type LIKE 'BEFORE%' THEN 'BEFORE'
                WHEN trigger_type LIKE 'INSTEAD OF%' THEN 'INSTEAD OF'
                ELSE 'AFTER'
            END AS timing,
            REGEXP_SUBSTR(triggering_event, '[A-Z]+') AS event,
            trigger_body AS statement
        FROM all_triggers
        WHERE table_owner = {owner} AND table_name = {table}
            AND UPPER(trigger_name) NOT LIKE 'XC_TRIGGER_%'
        ORDER BY trigger_name
        "#,
        owner = owner,
        table = table
    )
}

pub fn views(owner: &str) -> String {
    format!(
        "SELECT view_name AS view_name, text AS view_definition \
         FROM all_views WHERE owner = {} ORDER BY view_name",
        owner
    )
}

/// Routine names and their DDL; `kind` is `FUNCTION` or `PROCEDURE`.
pub fn routines(owner: &str, kind: &str) -> String {
    format!(
        "SELECT object_name AS routine_name, \
         DBMS_METADATA.GET_DDL('{kind}', object_name, owner) AS definition \
         FROM all_objects WHERE owner = {owner} AND object_type = '{kind}' \
         ORDER BY object_name",
        kind = kind,
        owner = owner
    )
}

pub fn sequences(owner: &str) -> String {
    format!(
        "SELECT sequence_name AS sequence_name, TO_CHAR(min_value) AS start_value, \
         TO_CHAR(increment_by) AS increment_by \
         FROM all_sequences WHERE sequence_owner = {} \
         AND sequence_name NOT LIKE 'ISEQ$$%' ORDER BY sequence_name",
        owner
    )
}

pub fn pk_constraint(owner: &str, table: &str) -> String {
    format!(
        "SELECT constraint_name AS name FROM all_constraints \
         WHERE owner = {} AND table_name = {} AND constraint_type = 'P'",
        owner, table
    )
}

pub const VERSION: &str = "SELECT version AS version FROM product_component_version \
     WHERE product LIKE 'Oracle%' AND ROWNUM = 1";

/// Oracle reports `NUMBER` precision for numerics and `char_length` for text.
pub fn column_from_record(table: &str, row: &Record) -> Column {
    let data_type = row.text("dt");
    let dt = data_type.to_ascii_lowercase();

    let (precision, scale) = match dt.as_str() {
        "number" | "float" => (row.opt_text("np"), row.opt_text("ns").filter(|s| s != "0")),
        "varchar2" | "nvarchar2" | "char" | "nchar" | "raw" => (
            row.get_i64("clen").filter(|l| *l > 0).map(|l| l.to_string()),
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
    col.required = row.text("nullable").eq_ignore_ascii_case("N");
    col.primary_key = row.get_bool("pk");
    col.auto_increment = row.get_bool("ai");
    col.auto_update = row.get_bool("au");
    // Identity columns report a sequence call as their default
    col.default = if col.auto_increment {
        None
    } else {
        row.opt_text("cdf")
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case("NULL"))
    };
    col.comment = row.opt_text("cc");
    col
}

pub fn columns_from_records(table: &str, rows: &[Record]) -> Vec<Column> {
    rows.iter().map(|r| column_from_record(table, r)).collect()
}
