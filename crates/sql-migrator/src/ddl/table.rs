//! Table-level DDL: create, alter, drop, rename.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

use crate::core::change::{CatalogFacts, DdlPair, Plan, TableRebuild, TableSnapshot};
use crate::core::diff::{diff_columns, ColumnChange, ColumnDiff};
use crate::core::schema::{Column, Relation, Table};
use crate::core::statement::{Statement, StatementBuilder};
use crate::core::traits::{AlterColumnStyle, AutoUpdateStyle, Dialect, RenameStyle};
use crate::error::Result;

use super::column::{
    auto_update_trigger_name, column_definition, default_constraint_name, default_value,
    effective_required, render_type, ColumnDelta,
};
use super::objects::{create_index_statement, foreign_key_clause, relation_pair};

/// `<builder>` followed by the schema-qualified table name.
pub(crate) fn on_table(d: &dyn Dialect, builder: StatementBuilder, table: &str) -> StatementBuilder {
    builder.qualified(d.schema(), table)
}

fn alter(d: &dyn Dialect, table: &str) -> StatementBuilder {
    on_table(d, d.builder().raw("ALTER TABLE "), table)
}

fn key_columns(columns: &[Column]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.clone())
        .collect()
}

fn disposable_name(column: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("{}_nc_{}", column, suffix)
}

// =============================================================================
// Auto-update triggers
// =============================================================================

/// Trigger pair keeping `column` at the current time on every update.
///
/// Returns `None` when the engine handles it inline, cannot do it, or the
/// trigger needs a key the table lacks.
pub(crate) fn auto_update_trigger(
    d: &dyn Dialect,
    table: &str,
    column: &str,
    pk: Option<&str>,
) -> Result<Option<DdlPair>> {
    let syntax = d.syntax();
    let name = auto_update_trigger_name(table, column);
    let schema = d.schema();

    let up = match syntax.auto_update {
        AutoUpdateStyle::OnUpdateClause => return Ok(None),
        AutoUpdateStyle::Unsupported => {
            warn!(
                "{} cannot maintain auto-update column {}.{}; skipped",
                d.name(),
                table,
                column
            );
            return Ok(None);
        }
        AutoUpdateStyle::InsertedTrigger | AutoUpdateStyle::RowTrigger if pk.is_none() => {
            warn!(
                "Auto-update column {}.{} needs a primary key; trigger skipped",
                table, column
            );
            return Ok(None);
        }
        AutoUpdateStyle::InsertedTrigger => {
            let pk = pk.unwrap_or_default();
            d.builder()
                .raw("CREATE TRIGGER ")
                .qualified(schema, &name)
                .raw(" ON ")
                .qualified(schema, table)
                .raw(" AFTER UPDATE AS BEGIN SET NOCOUNT ON; UPDATE ")
                .qualified(schema, table)
                .raw(" SET ")
                .ident(column)
                .raw(&format!(" = {} WHERE ", syntax.now))
                .ident(pk)
                .raw(" IN (SELECT ")
                .ident(pk)
                .raw(" FROM Inserted) END")
                .build()?
        }
        AutoUpdateStyle::RowTrigger => {
            let pk = pk.unwrap_or_default();
            d.builder()
                .raw("CREATE TRIGGER ")
                .ident(&name)
                .raw(" AFTER UPDATE ON ")
                .ident(table)
                .raw(" FOR EACH ROW BEGIN UPDATE ")
                .ident(table)
                .raw(" SET ")
                .ident(column)
                .raw(&format!(" = {} WHERE ", syntax.now))
                .ident(pk)
                .raw(" = old.")
                .ident(pk)
                .raw("; END")
                .build()?
        }
        AutoUpdateStyle::BeforeRowTrigger => d
            .builder()
            .raw("CREATE OR REPLACE TRIGGER ")
            .qualified(schema, &name)
            .raw(" BEFORE UPDATE ON ")
            .qualified(schema, table)
            .raw(" FOR EACH ROW BEGIN :NEW.")
            .ident(column)
            .raw(&format!(" := {}; END", syntax.now))
            .build()?,
    };

    let down = match syntax.auto_update {
        AutoUpdateStyle::BeforeRowTrigger => d.builder().raw("DROP TRIGGER ").qualified(schema, &name),
        _ => d
            .builder()
            .raw("DROP TRIGGER IF EXISTS ")
            .qualified(schema, &name),
    }
    .build()?;

    Ok(Some(DdlPair::new(vec![up], vec![down])))
}

fn pk_clause(d: &dyn Dialect, table: &str, pks: &[String]) -> Result<String> {
    let builder = match d.syntax().pk_naming.name_for(table) {
        Some(name) => d.builder().raw("CONSTRAINT ").ident(&name).raw(" "),
        None => d.builder(),
    };
    Ok(builder
        .raw("PRIMARY KEY (")
        .idents(pks)
        .raw(")")
        .build()?
        .into_string())
}

// =============================================================================
// Create / drop / rename
// =============================================================================

/// `CREATE TABLE` with its key, auto-update triggers and, on engines that only
/// accept them inline, foreign keys.
pub fn create_table(d: &dyn Dialect, table: &Table, relations: &[Relation]) -> Result<DdlPair> {
    let syntax = d.syntax();
    let pks = key_columns(&table.columns);

    let mut parts = Vec::with_capacity(table.columns.len() + 1);
    for col in &table.columns {
        parts.push(column_definition(d, &table.name, col, false)?);
    }
    if !pks.is_empty() {
        parts.push(pk_clause(d, &table.name, &pks)?);
    }
    if syntax.inline_foreign_keys {
        for relation in relations {
            parts.push(foreign_key_clause(d, relation)?);
        }
    }

    let create = on_table(d, d.builder().raw("CREATE TABLE "), &table.name)
        .raw(&format!(" ({})", parts.join(", ")))
        .build()?;
    let drop = on_table(d, d.builder().raw("DROP TABLE "), &table.name).build()?;

    let mut pair = DdlPair::new(vec![create], vec![drop]);
    let first_pk = pks.first().map(String::as_str);
    for col in table.columns.iter().filter(|c| c.auto_update) {
        if let Some(trigger) = auto_update_trigger(d, &table.name, &col.name, first_pk)? {
            // DROP TABLE takes the trigger with it
            pair.up.extend(trigger.up);
        }
    }

    if !syntax.inline_foreign_keys {
        for relation in relations {
            let fk = relation_pair(d, relation)?;
            pair.up.extend(fk.up);
        }
    }
    Ok(pair)
}

/// `DROP TABLE`, reversed by recreating the table, its indexes and foreign keys.
pub fn drop_table(d: &dyn Dialect, snapshot: &TableSnapshot) -> Result<DdlPair> {
    let table = &snapshot.table;
    let recreate = create_table(d, table, &snapshot.relations)?;

    let mut down = recreate.up;
    for index in &snapshot.indexes {
        let backs_constraint = index.primary
            || index.name.starts_with("fk_")
            || index.name.starts_with("sqlite_autoindex")
            || snapshot
                .relations
                .iter()
                .any(|r| r.constraint_name() == index.name);
        if !backs_constraint {
            down.push(create_index_statement(d, index)?);
        }
    }

    Ok(DdlPair::new(recreate.down, down))
}

fn rename_statement(d: &dyn Dialect, from: &str, to: &str) -> Result<Statement> {
    let schema = d.schema();
    match d.syntax().rename {
        RenameStyle::RenameTable => d
            .builder()
            .raw("RENAME TABLE ")
            .qualified(schema, from)
            .raw(" TO ")
            .qualified(schema, to)
            .build(),
        RenameStyle::SpRename => {
            let source = crate::core::identifier::qualify(d.quoting().ident, schema, from)?;
            d.builder()
                .raw("EXEC sp_rename ")
                .value(&source)
                .raw(", ")
                .value(to)
                .build()
        }
        RenameStyle::AlterRenameTo => alter(d, from).raw(" RENAME TO ").ident(to).build(),
    }
}

pub fn rename_table(d: &dyn Dialect, from: &str, to: &str) -> Result<DdlPair> {
    Ok(DdlPair::new(
        vec![rename_statement(d, from, to)?],
        vec![rename_statement(d, to, from)?],
    ))
}

// =============================================================================
// Alter
// =============================================================================

/// Diff `columns` against `original` and plan the minimal edits both ways.
pub fn alter_table(
    d: &dyn Dialect,
    table: &str,
    columns: &[Column],
    original: &[Column],
    facts: &CatalogFacts,
) -> Result<Plan> {
    let diff = diff_columns(columns, original);
    if diff.is_empty() {
        return Ok(Plan::default());
    }

    let (mut up, rebuild_up) = render_alter(d, table, &diff, columns, facts, true)?;
    let (mut down, rebuild_down) = render_alter(d, table, &diff.inverse(), original, facts, false)?;

    if d.select_probe() {
        let probe = d
            .builder()
            .raw("SELECT 1 FROM ")
            .ident(table)
            .raw(" LIMIT 1")
            .build()?;
        up.insert(0, probe.clone());
        down.insert(0, probe);
    }

    Ok(Plan {
        ddl: DdlPair::new(up, down),
        rebuild_up,
        rebuild_down,
    })
}

fn render_alter(
    d: &dyn Dialect,
    table: &str,
    diff: &ColumnDiff,
    resulting: &[Column],
    facts: &CatalogFacts,
    forward: bool,
) -> Result<(Vec<Statement>, Option<TableRebuild>)> {
    match d.syntax().alter_column {
        AlterColumnStyle::Change => Ok((change_style(d, table, diff)?, None)),
        AlterColumnStyle::Copy => copy_style(d, table, diff, resulting, facts),
        _ => {
            // The live constraint name only applies to the key as it is now.
            let pk_name = if forward {
                facts.pk_constraint.as_deref()
            } else {
                None
            };
            Ok((statement_style(d, table, diff, resulting, pk_name)?, None))
        }
    }
}

/// One `ALTER TABLE` carrying every clause (MySQL).
fn change_style(d: &dyn Dialect, table: &str, diff: &ColumnDiff) -> Result<Vec<Statement>> {
    let quoting = d.quoting();
    let mut clauses = Vec::new();

    if let Some(pk) = &diff.pk {
        if !pk.old.is_empty() {
            clauses.push("DROP PRIMARY KEY".to_string());
        }
    }
    for change in &diff.changes {
        match change {
            ColumnChange::Removed(col) => {
                clauses.push(format!("DROP COLUMN {}", quoting.ident(&col.name)?))
            }
            ColumnChange::Added(col) => clauses.push(format!(
                "ADD COLUMN {}",
                column_definition(d, table, col, true)?
            )),
            ColumnChange::Modified { old, new } if ColumnDelta::between(old, new).any() => {
                clauses.push(format!(
                    "CHANGE COLUMN {} {}",
                    quoting.ident(&old.name)?,
                    column_definition(d, table, new, false)?
                ))
            }
            _ => {}
        }
    }
    if let Some(pk) = &diff.pk {
        if !pk.new.is_empty() {
            clauses.push(format!(
                "ADD PRIMARY KEY ({})",
                pk.new
                    .iter()
                    .map(|c| quoting.ident(c))
                    .collect::<Result<Vec<_>>>()?
                    .join(", ")
            ));
        }
    }

    if clauses.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![alter(d, table)
        .raw(" ")
        .raw(&clauses.join(", "))
        .build()?])
}

fn drop_pk_statement(d: &dyn Dialect, table: &str, live_name: Option<&str>) -> Result<Statement> {
    let name = live_name
        .map(str::to_string)
        .or_else(|| d.syntax().pk_naming.name_for(table));
    match name {
        Some(name) => alter(d, table).raw(" DROP CONSTRAINT ").ident(&name).build(),
        None => alter(d, table).raw(" DROP PRIMARY KEY").build(),
    }
}

fn add_pk_statement(d: &dyn Dialect, table: &str, pks: &[String]) -> Result<Statement> {
    alter(d, table)
        .raw(" ADD ")
        .raw(&pk_clause(d, table, pks)?)
        .build()
}

fn add_column_statement(d: &dyn Dialect, table: &str, col: &Column) -> Result<Statement> {
    let definition = column_definition(d, table, col, true)?;
    let clause = match d.syntax().alter_column {
        AlterColumnStyle::Modify => format!(" ADD ({})", definition),
        AlterColumnStyle::AlterColumn => format!(" ADD {}", definition),
        _ => format!(" ADD COLUMN {}", definition),
    };
    alter(d, table).raw(&clause).build()
}

fn drop_default_statement(d: &dyn Dialect, table: &str, col: &Column) -> Result<Statement> {
    let name = col
        .default_constraint
        .clone()
        .unwrap_or_else(|| default_constraint_name(table, &col.name));
    alter(d, table).raw(" DROP CONSTRAINT ").ident(&name).build()
}

fn drop_column_statement(d: &dyn Dialect, table: &str, column: &str) -> Result<Statement> {
    alter(d, table).raw(" DROP COLUMN ").ident(column).build()
}

fn push_trigger(
    out: &mut Vec<Statement>,
    d: &dyn Dialect,
    table: &str,
    column: &str,
    pk: Option<&str>,
    create: bool,
) -> Result<()> {
    if let Some(pair) = auto_update_trigger(d, table, column, pk)? {
        out.extend(if create { pair.up } else { pair.down });
    }
    Ok(())
}

/// One statement per edit (SQL Server, Oracle, Snowflake).
fn statement_style(
    d: &dyn Dialect,
    table: &str,
    diff: &ColumnDiff,
    resulting: &[Column],
    pk_name: Option<&str>,
) -> Result<Vec<Statement>> {
    let syntax = d.syntax();
    let pk = resulting.iter().find(|c| c.primary_key).map(|c| c.name.as_str());
    let mut out = Vec::new();

    if let Some(pk_diff) = &diff.pk {
        if !pk_diff.old.is_empty() {
            out.push(drop_pk_statement(d, table, pk_name)?);
        }
    }

    for change in &diff.changes {
        match change {
            ColumnChange::Unchanged(_) => {}
            ColumnChange::Removed(col) => {
                if col.auto_update {
                    push_trigger(&mut out, d, table, &col.name, pk, false)?;
                }
                if syntax.default_constraints && col.default.is_some() {
                    out.push(drop_default_statement(d, table, col)?);
                }
                out.push(drop_column_statement(d, table, &col.name)?);
            }
            ColumnChange::Added(col) => {
                out.push(add_column_statement(d, table, col)?);
                if col.auto_update {
                    push_trigger(&mut out, d, table, &col.name, pk, true)?;
                }
            }
            ColumnChange::Modified { old, new } => {
                let delta = ColumnDelta::between(old, new);
                if !delta.any() {
                    continue;
                }
                if delta.auto_increment {
                    return Err(d.unsupported("changing auto-increment of an existing column"));
                }
                if old.auto_update && (delta.renamed || delta.auto_update) {
                    push_trigger(&mut out, d, table, &old.name, pk, false)?;
                }
                match syntax.alter_column {
                    AlterColumnStyle::AlterColumn => {
                        out.extend(alter_column_edits(d, table, old, new, &delta)?)
                    }
                    AlterColumnStyle::Modify => out.extend(modify_edits(d, table, old, new, &delta)?),
                    _ => out.extend(set_data_type_edits(d, table, old, new, &delta)?),
                }
                if new.auto_update && (delta.renamed || delta.auto_update) {
                    push_trigger(&mut out, d, table, &new.name, pk, true)?;
                }
            }
        }
    }

    if let Some(pk_diff) = &diff.pk {
        if !pk_diff.new.is_empty() {
            out.push(add_pk_statement(d, table, &pk_diff.new)?);
        }
    }
    Ok(out)
}

/// SQL Server: defaults are constraints that pin the column, so they come off
/// before a rename or retype and go back on afterwards.
fn alter_column_edits(
    d: &dyn Dialect,
    table: &str,
    old: &Column,
    new: &Column,
    delta: &ColumnDelta,
) -> Result<Vec<Statement>> {
    let mut out = Vec::new();
    let touch_default = delta.default || delta.renamed || delta.retyped;

    if touch_default && old.default.is_some() {
        out.push(drop_default_statement(d, table, old)?);
    }
    if delta.renamed {
        let source = format!(
            "{}.{}",
            crate::core::identifier::qualify(d.quoting().ident, d.schema(), table)?,
            d.quoting().ident(&old.name)?
        );
        out.push(
            d.builder()
                .raw("EXEC sp_rename ")
                .value(&source)
                .raw(", ")
                .value(&new.name)
                .raw(", 'COLUMN'")
                .build()?,
        );
    }
    if delta.retyped || delta.nullability {
        out.push(
            alter(d, table)
                .raw(" ALTER COLUMN ")
                .ident(&new.name)
                .raw(" ")
                .raw(&render_type(d, new)?)
                .raw(if effective_required(new) {
                    " NOT NULL"
                } else {
                    " NULL"
                })
                .build()?,
        );
    }
    if touch_default {
        if let Some(value) = default_value(d, new)? {
            out.push(
                alter(d, table)
                    .raw(" ADD CONSTRAINT ")
                    .ident(&default_constraint_name(table, &new.name))
                    .raw(&format!(" DEFAULT {} FOR ", value))
                    .ident(&new.name)
                    .build()?,
            );
        }
    }
    Ok(out)
}

/// Oracle: `RENAME COLUMN` then `MODIFY (...)` per aspect.
fn modify_edits(
    d: &dyn Dialect,
    table: &str,
    old: &Column,
    new: &Column,
    delta: &ColumnDelta,
) -> Result<Vec<Statement>> {
    let mut out = Vec::new();
    let modify = |body: String| -> Result<Statement> {
        alter(d, table)
            .raw(" MODIFY (")
            .ident(&new.name)
            .raw(&format!(" {})", body))
            .build()
    };

    if delta.renamed {
        out.push(
            alter(d, table)
                .raw(" RENAME COLUMN ")
                .ident(&old.name)
                .raw(" TO ")
                .ident(&new.name)
                .build()?,
        );
    }
    if delta.retyped {
        out.push(modify(render_type(d, new)?)?);
    }
    if delta.default {
        let value = default_value(d, new)?.unwrap_or_else(|| "NULL".to_string());
        out.push(modify(format!("DEFAULT {}", value))?);
    }
    if delta.nullability {
        out.push(modify(
            if effective_required(new) { "NOT NULL" } else { "NULL" }.to_string(),
        )?);
    }
    Ok(out)
}

/// Snowflake: `RENAME COLUMN` then `ALTER COLUMN ... SET/DROP` per aspect.
fn set_data_type_edits(
    d: &dyn Dialect,
    table: &str,
    old: &Column,
    new: &Column,
    delta: &ColumnDelta,
) -> Result<Vec<Statement>> {
    let mut out = Vec::new();
    let alter_column = |tail: String| -> Result<Statement> {
        alter(d, table)
            .raw(" ALTER COLUMN ")
            .ident(&new.name)
            .raw(&format!(" {}", tail))
            .build()
    };

    if delta.renamed {
        out.push(
            alter(d, table)
                .raw(" RENAME COLUMN ")
                .ident(&old.name)
                .raw(" TO ")
                .ident(&new.name)
                .build()?,
        );
    }
    if delta.retyped {
        out.push(alter_column(format!("SET DATA TYPE {}", render_type(d, new)?))?);
    }
    if delta.nullability {
        out.push(alter_column(
            if effective_required(new) {
                "SET NOT NULL"
            } else {
                "DROP NOT NULL"
            }
            .to_string(),
        )?);
    }
    if delta.default {
        out.push(alter_column(match default_value(d, new)? {
            Some(value) => format!("SET DEFAULT {}", value),
            None => "DROP DEFAULT".to_string(),
        })?);
    }
    Ok(out)
}

/// SQLite: rename-add-copy-drop per edited column. When a key column or a
/// column pinned by an index or foreign key changes, the whole edit goes
/// through one table rebuild instead and no per-column statements are emitted.
fn copy_style(
    d: &dyn Dialect,
    table: &str,
    diff: &ColumnDiff,
    resulting: &[Column],
    facts: &CatalogFacts,
) -> Result<(Vec<Statement>, Option<TableRebuild>)> {
    let pinned = |col: &Column| {
        col.primary_key
            || facts
                .constrained_columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&col.name))
    };
    let needs_rebuild = diff.pk.is_some()
        || diff.changes.iter().any(|change| match change {
            ColumnChange::Removed(col) => pinned(col),
            ColumnChange::Modified { old, new } => {
                ColumnDelta::between(old, new).any() && (pinned(old) || pinned(new))
            }
            _ => false,
        });

    if needs_rebuild {
        return Ok((Vec::new(), Some(rebuild_for(table, diff, resulting))));
    }

    let pk = resulting.iter().find(|c| c.primary_key).map(|c| c.name.as_str());
    let mut out = Vec::new();
    for change in &diff.changes {
        match change {
            ColumnChange::Unchanged(_) => {}
            ColumnChange::Removed(col) => {
                if col.auto_update {
                    push_trigger(&mut out, d, table, &col.name, pk, false)?;
                }
                out.push(drop_column_statement(d, table, &col.name)?);
            }
            ColumnChange::Added(col) => {
                out.push(add_column_statement(d, table, col)?);
                if col.auto_update {
                    push_trigger(&mut out, d, table, &col.name, pk, true)?;
                }
            }
            ColumnChange::Modified { old, new } => {
                if !ColumnDelta::between(old, new).any() {
                    continue;
                }
                if old.auto_update {
                    push_trigger(&mut out, d, table, &old.name, pk, false)?;
                }
                let disposable = disposable_name(&old.name);
                out.push(
                    alter(d, table)
                        .raw(" RENAME COLUMN ")
                        .ident(&old.name)
                        .raw(" TO ")
                        .ident(&disposable)
                        .build()?,
                );
                out.push(add_column_statement(d, table, new)?);
                out.push(
                    d.builder()
                        .raw("UPDATE ")
                        .ident(table)
                        .raw(" SET ")
                        .ident(&new.name)
                        .raw(" = ")
                        .ident(&disposable)
                        .build()?,
                );
                out.push(drop_column_statement(d, table, &disposable)?);
                if new.auto_update {
                    push_trigger(&mut out, d, table, &new.name, pk, true)?;
                }
            }
        }
    }
    Ok((out, None))
}

/// Rebuild carrying every column edit of `diff`, renames included.
fn rebuild_for(table: &str, diff: &ColumnDiff, resulting: &[Column]) -> TableRebuild {
    let renames = diff
        .changes
        .iter()
        .filter_map(|change| match change {
            ColumnChange::Modified { old, new } if old.name != new.name => {
                Some((new.name.clone(), old.name.clone()))
            }
            _ => None,
        })
        .collect();
    let (old_pks, new_pks, drop_pks) = match &diff.pk {
        Some(pk) => (pk.old.clone(), pk.new.clone(), pk.dropped.clone()),
        None => {
            let keys = key_columns(resulting);
            (keys.clone(), keys, Vec::new())
        }
    };
    TableRebuild {
        table: table.to_string(),
        columns: Some(resulting.to_vec()),
        renames,
        old_pks,
        new_pks,
        drop_pks,
        ..Default::default()
    }
}
