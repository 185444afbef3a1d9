//! Reversible DDL generation.
//!
//! Every structural change is rendered twice: the forward statements and the
//! statements that undo them. Rendering is pure. Catalog lookups a change
//! depends on arrive through [`CatalogFacts`], gathered by the driver first.

pub mod column;
pub mod objects;
pub mod table;

use crate::core::change::{CatalogFacts, Plan, SchemaChange, TableRebuild};
use crate::core::traits::Dialect;
use crate::error::{MigrateError, Result};

pub use column::{auto_update_trigger_name, default_constraint_name};

/// Plan forward and reverse DDL for one change.
pub fn plan(d: &dyn Dialect, change: &SchemaChange, facts: &CatalogFacts) -> Result<Plan> {
    match change {
        SchemaChange::CreateTable { table } => Ok(Plan::from_ddl(table::create_table(d, table, &[])?)),
        SchemaChange::AlterTable {
            table,
            columns,
            original,
        } => table::alter_table(d, table, columns, original, facts),
        SchemaChange::DropTable { table } => {
            let snapshot = facts
                .snapshot
                .as_ref()
                .ok_or_else(|| MigrateError::TableNotFound(table.clone()))?;
            Ok(Plan::from_ddl(table::drop_table(d, snapshot)?))
        }
        SchemaChange::RenameTable { from, to } => Ok(Plan::from_ddl(table::rename_table(d, from, to)?)),

        SchemaChange::CreateIndex { index } => Ok(Plan::from_ddl(objects::index_pair(d, index)?)),
        SchemaChange::DropIndex { index } => {
            Ok(Plan::from_ddl(objects::index_pair(d, index)?).inverted())
        }

        SchemaChange::CreateRelation { relation } => relation_plan(d, relation),
        SchemaChange::DropRelation { relation } => Ok(relation_plan(d, relation)?.inverted()),

        SchemaChange::CreateSequence { sequence } => {
            Ok(Plan::from_ddl(objects::create_sequence(d, sequence)?))
        }
        SchemaChange::UpdateSequence { old, new } => {
            Ok(Plan::from_ddl(objects::update_sequence(d, old, new)?))
        }
        SchemaChange::DropSequence { sequence } => {
            Ok(Plan::from_ddl(objects::create_sequence(d, sequence)?).inverted())
        }

        SchemaChange::CreateView { view } => Ok(Plan::from_ddl(objects::create_view(d, view)?)),
        SchemaChange::UpdateView { old, new } => Ok(Plan::from_ddl(objects::update_view(d, old, new)?)),
        SchemaChange::DropView { view } => Ok(Plan::from_ddl(objects::create_view(d, view)?).inverted()),

        SchemaChange::CreateTrigger { trigger } => {
            Ok(Plan::from_ddl(objects::create_trigger(d, trigger)?))
        }
        SchemaChange::UpdateTrigger { old, new } => {
            Ok(Plan::from_ddl(objects::update_trigger(d, old, new)?))
        }
        SchemaChange::DropTrigger { trigger } => {
            Ok(Plan::from_ddl(objects::create_trigger(d, trigger)?).inverted())
        }

        SchemaChange::CreateRoutine { routine } => {
            Ok(Plan::from_ddl(objects::create_routine(d, routine)?))
        }
        SchemaChange::UpdateRoutine { old, new } => {
            Ok(Plan::from_ddl(objects::update_routine(d, old, new)?))
        }
        SchemaChange::DropRoutine { routine } => {
            Ok(Plan::from_ddl(objects::create_routine(d, routine)?).inverted())
        }
    }
}

fn relation_plan(d: &dyn Dialect, relation: &crate::core::schema::Relation) -> Result<Plan> {
    if !d.syntax().inline_foreign_keys {
        return Ok(Plan::from_ddl(objects::relation_pair(d, relation)?));
    }
    let mut add = TableRebuild::new(&relation.table);
    add.add_relations.push(relation.clone());
    let mut drop = TableRebuild::new(&relation.table);
    drop.drop_relations.push(relation.clone());
    Ok(Plan {
        rebuild_up: Some(add),
        rebuild_down: Some(drop),
        ..Default::default()
    })
}
