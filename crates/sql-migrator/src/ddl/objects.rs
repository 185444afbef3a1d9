//! DDL for indexes, foreign keys, sequences, views, triggers and routines.

use crate::core::change::DdlPair;
use crate::core::schema::{
    Index, ReferentialAction, Relation, Routine, Sequence, Trigger, TriggerTiming, View,
};
use crate::core::statement::{Statement, StatementBuilder};
use crate::core::traits::{Dialect, SequenceRename, TriggerStyle, ViewUpdateStyle};
use crate::error::Result;

fn named(d: &dyn Dialect, builder: StatementBuilder, schema: &Option<String>, name: &str) -> StatementBuilder {
    builder.qualified(schema.as_deref().or(d.schema()), name)
}

// =============================================================================
// Indexes
// =============================================================================

pub(crate) fn create_index_statement(d: &dyn Dialect, index: &Index) -> Result<Statement> {
    d.builder()
        .raw(if index.non_unique {
            "CREATE INDEX "
        } else {
            "CREATE UNIQUE INDEX "
        })
        .ident(&index.name)
        .raw(" ON ")
        .qualified(d.schema(), &index.table)
        .raw(" (")
        .idents(&index.column_names())
        .raw(")")
        .build()
}

fn drop_index_statement(d: &dyn Dialect, index: &Index) -> Result<Statement> {
    let on_table = d.syntax().drop_index_on_table;
    d.builder()
        .raw("DROP INDEX ")
        .ident(&index.name)
        .when(on_table, |b| b.raw(" ON ").qualified(d.schema(), &index.table))
        .build()
}

pub fn index_pair(d: &dyn Dialect, index: &Index) -> Result<DdlPair> {
    if !d.syntax().objects.indexes {
        return Err(d.unsupported("indexes"));
    }
    Ok(DdlPair::new(
        vec![create_index_statement(d, index)?],
        vec![drop_index_statement(d, index)?],
    ))
}

// =============================================================================
// Foreign keys
// =============================================================================

fn action_clause(d: &dyn Dialect, keyword: &str, action: ReferentialAction) -> Option<String> {
    match action {
        ReferentialAction::NoAction => None,
        ReferentialAction::Restrict if !d.syntax().fk_restrict => None,
        other => Some(format!(" {} {}", keyword, other.as_sql())),
    }
}

/// `CONSTRAINT fk FOREIGN KEY (c) REFERENCES p (pc) [ON UPDATE ..] [ON DELETE ..]`
pub(crate) fn foreign_key_clause(d: &dyn Dialect, relation: &Relation) -> Result<String> {
    let syntax = d.syntax();
    let mut clause = d
        .builder()
        .raw("CONSTRAINT ")
        .ident(&relation.constraint_name())
        .raw(" FOREIGN KEY (")
        .ident(&relation.column)
        .raw(") REFERENCES ")
        .qualified(d.schema(), &relation.parent_table)
        .raw(" (")
        .ident(&relation.parent_column)
        .raw(")")
        .build()?
        .into_string();

    if syntax.fk_on_update {
        if let Some(on_update) = action_clause(d, "ON UPDATE", relation.on_update) {
            clause.push_str(&on_update);
        }
    }
    if let Some(on_delete) = action_clause(d, "ON DELETE", relation.on_delete) {
        clause.push_str(&on_delete);
    }
    Ok(clause)
}

/// `ALTER TABLE ... ADD CONSTRAINT` and its drop. Engines that only accept
/// foreign keys inline route through a table rebuild instead.
pub fn relation_pair(d: &dyn Dialect, relation: &Relation) -> Result<DdlPair> {
    let syntax = d.syntax();
    let up = d
        .builder()
        .raw("ALTER TABLE ")
        .qualified(d.schema(), &relation.table)
        .raw(" ADD ")
        .raw(&foreign_key_clause(d, relation)?)
        .build()?;
    let down = d
        .builder()
        .raw("ALTER TABLE ")
        .qualified(d.schema(), &relation.table)
        .raw(&format!(" DROP {} ", syntax.drop_foreign_key))
        .ident(&relation.constraint_name())
        .build()?;
    Ok(DdlPair::new(vec![up], vec![down]))
}

// =============================================================================
// Sequences
// =============================================================================

fn create_sequence_statement(d: &dyn Dialect, sequence: &Sequence) -> Result<Statement> {
    let mut builder = named(d, d.builder().raw("CREATE SEQUENCE "), &sequence.schema, &sequence.name);
    if let Some(start) = sequence.start {
        builder = builder.raw(&format!(" START WITH {}", start));
    }
    if let Some(increment) = sequence.increment {
        builder = builder.raw(&format!(" INCREMENT BY {}", increment));
    }
    builder.build()
}

fn drop_sequence_statement(d: &dyn Dialect, sequence: &Sequence) -> Result<Statement> {
    named(d, d.builder().raw("DROP SEQUENCE "), &sequence.schema, &sequence.name).build()
}

fn rename_sequence_statement(d: &dyn Dialect, from: &Sequence, to: &str) -> Result<Statement> {
    match d.syntax().sequence_rename {
        SequenceRename::AlterSequence => named(d, d.builder().raw("ALTER SEQUENCE "), &from.schema, &from.name)
            .raw(" RENAME TO ")
            .ident(to)
            .build(),
        SequenceRename::Rename => d
            .builder()
            .raw("RENAME ")
            .ident(&from.name)
            .raw(" TO ")
            .ident(to)
            .build(),
        SequenceRename::SpRename => {
            let source = crate::core::identifier::qualify(
                d.quoting().ident,
                from.schema.as_deref().or(d.schema()),
                &from.name,
            )?;
            d.builder()
                .raw("EXEC sp_rename ")
                .value(&source)
                .raw(", ")
                .value(to)
                .build()
        }
    }
}

fn sequence_steps(d: &dyn Dialect, from: &Sequence, to: &Sequence) -> Result<Vec<Statement>> {
    let mut out = Vec::new();
    if from.name != to.name {
        out.push(rename_sequence_statement(d, from, &to.name)?);
    }
    if from.increment != to.increment {
        if let Some(increment) = to.increment {
            out.push(
                named(d, d.builder().raw("ALTER SEQUENCE "), &to.schema, &to.name)
                    .raw(&format!(" INCREMENT BY {}", increment))
                    .build()?,
            );
        }
    }
    Ok(out)
}

pub fn create_sequence(d: &dyn Dialect, sequence: &Sequence) -> Result<DdlPair> {
    if !d.syntax().objects.sequences {
        return Err(d.unsupported("sequences"));
    }
    Ok(DdlPair::new(
        vec![create_sequence_statement(d, sequence)?],
        vec![drop_sequence_statement(d, sequence)?],
    ))
}

pub fn update_sequence(d: &dyn Dialect, old: &Sequence, new: &Sequence) -> Result<DdlPair> {
    if !d.syntax().objects.sequences {
        return Err(d.unsupported("sequences"));
    }
    Ok(DdlPair::new(
        sequence_steps(d, old, new)?,
        sequence_steps(d, new, old)?,
    ))
}

// =============================================================================
// Views
// =============================================================================

fn create_view_statement(d: &dyn Dialect, view: &View, keyword: &str) -> Result<Statement> {
    named(d, d.builder().raw(keyword), &view.schema, &view.name)
        .raw(" AS ")
        .raw(view.definition.trim())
        .build()
}

fn drop_view_statement(d: &dyn Dialect, view: &View) -> Result<Statement> {
    named(d, d.builder().raw("DROP VIEW "), &view.schema, &view.name).build()
}

fn replace_view(d: &dyn Dialect, from: &View, to: &View) -> Result<Vec<Statement>> {
    if from.name != to.name {
        return Ok(vec![
            drop_view_statement(d, from)?,
            create_view_statement(d, to, "CREATE VIEW ")?,
        ]);
    }
    Ok(match d.syntax().view_update {
        ViewUpdateStyle::CreateOrReplace => vec![create_view_statement(d, to, "CREATE OR REPLACE VIEW ")?],
        ViewUpdateStyle::Alter => vec![create_view_statement(d, to, "ALTER VIEW ")?],
        ViewUpdateStyle::DropCreate => vec![
            drop_view_statement(d, from)?,
            create_view_statement(d, to, "CREATE VIEW ")?,
        ],
    })
}

pub fn create_view(d: &dyn Dialect, view: &View) -> Result<DdlPair> {
    if !d.syntax().objects.views {
        return Err(d.unsupported("views"));
    }
    Ok(DdlPair::new(
        vec![create_view_statement(d, view, "CREATE VIEW ")?],
        vec![drop_view_statement(d, view)?],
    ))
}

pub fn update_view(d: &dyn Dialect, old: &View, new: &View) -> Result<DdlPair> {
    if !d.syntax().objects.views {
        return Err(d.unsupported("views"));
    }
    Ok(DdlPair::new(replace_view(d, old, new)?, replace_view(d, new, old)?))
}

// =============================================================================
// Triggers
// =============================================================================

fn create_trigger_statement(d: &dyn Dialect, trigger: &Trigger) -> Result<Statement> {
    let body = trigger.statement.trim().trim_end_matches(';').trim_end();
    let head = |b: StatementBuilder| named(d, b.raw("CREATE TRIGGER "), &trigger.schema, &trigger.name);

    match d.syntax().trigger_style {
        TriggerStyle::RowLevel => head(d.builder())
            .raw(&format!(" {} {} ON ", trigger.timing.as_sql(), trigger.event.as_sql()))
            .qualified(d.schema(), &trigger.table)
            .raw(" FOR EACH ROW ")
            .raw(body)
            .build(),
        TriggerStyle::RowLevelBlock => head(d.builder())
            .raw(&format!(" {} {} ON ", trigger.timing.as_sql(), trigger.event.as_sql()))
            .qualified(d.schema(), &trigger.table)
            .raw(" FOR EACH ROW BEGIN ")
            .raw(body)
            .raw("; END")
            .build(),
        TriggerStyle::StatementLevel => {
            if trigger.timing == TriggerTiming::Before {
                return Err(d.unsupported("BEFORE triggers"));
            }
            head(d.builder())
                .raw(" ON ")
                .qualified(d.schema(), &trigger.table)
                .raw(&format!(
                    " {} {} AS BEGIN ",
                    trigger.timing.as_sql(),
                    trigger.event.as_sql()
                ))
                .raw(body)
                .raw(" END")
                .build()
        }
    }
}

fn drop_trigger_statement(d: &dyn Dialect, trigger: &Trigger) -> Result<Statement> {
    named(d, d.builder().raw("DROP TRIGGER "), &trigger.schema, &trigger.name).build()
}

pub fn create_trigger(d: &dyn Dialect, trigger: &Trigger) -> Result<DdlPair> {
    if !d.syntax().objects.triggers {
        return Err(d.unsupported("triggers"));
    }
    Ok(DdlPair::new(
        vec![create_trigger_statement(d, trigger)?],
        vec![drop_trigger_statement(d, trigger)?],
    ))
}

pub fn update_trigger(d: &dyn Dialect, old: &Trigger, new: &Trigger) -> Result<DdlPair> {
    if !d.syntax().objects.triggers {
        return Err(d.unsupported("triggers"));
    }
    Ok(DdlPair::new(
        vec![drop_trigger_statement(d, old)?, create_trigger_statement(d, new)?],
        vec![drop_trigger_statement(d, new)?, create_trigger_statement(d, old)?],
    ))
}

// =============================================================================
// Functions and procedures
// =============================================================================

fn drop_routine_statement(d: &dyn Dialect, routine: &Routine) -> Result<Statement> {
    named(
        d,
        d.builder().raw(&format!("DROP {} ", routine.kind.keyword())),
        &routine.schema,
        &routine.name,
    )
    .build()
}

pub fn create_routine(d: &dyn Dialect, routine: &Routine) -> Result<DdlPair> {
    if !d.syntax().objects.routines {
        return Err(d.unsupported("functions and procedures"));
    }
    Ok(DdlPair::new(
        vec![Statement::raw(routine.definition.as_str())],
        vec![drop_routine_statement(d, routine)?],
    ))
}

pub fn update_routine(d: &dyn Dialect, old: &Routine, new: &Routine) -> Result<DdlPair> {
    if !d.syntax().objects.routines {
        return Err(d.unsupported("functions and procedures"));
    }
    Ok(DdlPair::new(
        vec![
            drop_routine_statement(d, old)?,
            Statement::raw(new.definition.as_str()),
        ],
        vec![
            drop_routine_statement(d, new)?,
            Statement::raw(old.definition.as_str()),
        ],
    ))
}
