//! Schema change requests and the plans generated for them.
//!
//! A [`SchemaChange`] describes one structural edit. A driver turns it into a
//! [`Plan`]: forward and reverse statement lists plus, for engines that cannot
//! alter keys or foreign keys in place, a [`TableRebuild`] instruction that the
//! driver expands against the live catalog before the plan is recorded.

use super::schema::{Column, Index, Relation, Routine, Sequence, Table, Trigger, View};
use super::statement::Statement;
use serde::{Deserialize, Serialize};

/// One structural edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SchemaChange {
    CreateTable {
        table: Table,
    },
    /// `columns` is the full edited list; `original` is what introspection returned.
    AlterTable {
        table: String,
        columns: Vec<Column>,
        original: Vec<Column>,
    },
    DropTable {
        table: String,
    },
    RenameTable {
        from: String,
        to: String,
    },
    CreateIndex {
        index: Index,
    },
    DropIndex {
        index: Index,
    },
    CreateRelation {
        relation: Relation,
    },
    DropRelation {
        relation: Relation,
    },
    CreateSequence {
        sequence: Sequence,
    },
    UpdateSequence {
        old: Sequence,
        new: Sequence,
    },
    DropSequence {
        sequence: Sequence,
    },
    CreateView {
        view: View,
    },
    UpdateView {
        old: View,
        new: View,
    },
    DropView {
        view: View,
    },
    CreateTrigger {
        trigger: Trigger,
    },
    UpdateTrigger {
        old: Trigger,
        new: Trigger,
    },
    DropTrigger {
        trigger: Trigger,
    },
    /// Functions and procedures.
    CreateRoutine {
        routine: Routine,
    },
    UpdateRoutine {
        old: Routine,
        new: Routine,
    },
    DropRoutine {
        routine: Routine,
    },
}

impl SchemaChange {
    /// Short operation name used in logs and telemetry.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateTable { .. } => "table_create",
            Self::AlterTable { .. } => "table_update",
            Self::DropTable { .. } => "table_delete",
            Self::RenameTable { .. } => "table_rename",
            Self::CreateIndex { .. } => "index_create",
            Self::DropIndex { .. } => "index_delete",
            Self::CreateRelation { .. } => "relation_create",
            Self::DropRelation { .. } => "relation_delete",
            Self::CreateSequence { .. } => "sequence_create",
            Self::UpdateSequence { .. } => "sequence_update",
            Self::DropSequence { .. } => "sequence_delete",
            Self::CreateView { .. } => "view_create",
            Self::UpdateView { .. } => "view_update",
            Self::DropView { .. } => "view_delete",
            Self::CreateTrigger { .. } => "trigger_create",
            Self::UpdateTrigger { .. } => "trigger_update",
            Self::DropTrigger { .. } => "trigger_delete",
            Self::CreateRoutine { .. } => "routine_create",
            Self::UpdateRoutine { .. } => "routine_update",
            Self::DropRoutine { .. } => "routine_delete",
        }
    }

    /// The table the change is anchored on, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::CreateTable { table } => Some(&table.name),
            Self::AlterTable { table, .. } | Self::DropTable { table } => Some(table),
            Self::RenameTable { from, .. } => Some(from),
            Self::CreateIndex { index } | Self::DropIndex { index } => Some(&index.table),
            Self::CreateRelation { relation } | Self::DropRelation { relation } => {
                Some(&relation.table)
            }
            Self::CreateTrigger { trigger } | Self::DropTrigger { trigger } => Some(&trigger.table),
            Self::UpdateTrigger { new, .. } => Some(&new.table),
            _ => None,
        }
    }
}

/// Forward and reverse statements of one change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DdlPair {
    pub up: Vec<Statement>,
    pub down: Vec<Statement>,
}

impl DdlPair {
    pub fn new(up: Vec<Statement>, down: Vec<Statement>) -> Self {
        Self { up, down }
    }

    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }

    /// Swap forward and reverse statements.
    pub fn inverted(self) -> Self {
        Self {
            up: self.down,
            down: self.up,
        }
    }

    /// Append another pair. Reverse statements of `other` run before ours.
    pub fn extend(&mut self, other: DdlPair) {
        self.up.extend(other.up);
        let mut down = other.down;
        down.append(&mut self.down);
        self.down = down;
    }
}

/// Recreate-and-copy instruction for engines without in-place key edits.
///
/// The driver fills in whatever the instruction leaves open (current indexes,
/// foreign keys, triggers) from the catalog when it expands it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TableRebuild {
    pub table: String,
    /// Column list of the rebuilt table; `None` keeps the current columns.
    pub columns: Option<Vec<Column>>,
    /// `(target, source)` pairs for renamed columns.
    pub renames: Vec<(String, String)>,
    /// Key columns before the change.
    pub old_pks: Vec<String>,
    /// Key columns after the change.
    pub new_pks: Vec<String>,
    /// Former key columns that disappear with the change.
    pub drop_pks: Vec<String>,
    pub add_relations: Vec<Relation>,
    pub drop_relations: Vec<Relation>,
}

impl TableRebuild {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Source column feeding `target` in the copy step.
    pub fn source_of<'a>(&'a self, target: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, s)| s.as_str())
            .unwrap_or(target)
    }
}

/// Output of planning one change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    pub ddl: DdlPair,
    /// Appended to `ddl.up` once expanded.
    pub rebuild_up: Option<TableRebuild>,
    /// Appended to `ddl.down` once expanded.
    pub rebuild_down: Option<TableRebuild>,
}

impl Plan {
    pub fn from_ddl(ddl: DdlPair) -> Self {
        Self {
            ddl,
            ..Default::default()
        }
    }

    /// The plan that undoes this one.
    pub fn inverted(self) -> Self {
        Self {
            ddl: self.ddl.inverted(),
            rebuild_up: self.rebuild_down,
            rebuild_down: self.rebuild_up,
        }
    }

    pub fn needs_rebuild(&self) -> bool {
        self.rebuild_up.is_some() || self.rebuild_down.is_some()
    }
}

/// Everything the generator needs to drop a table reversibly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSnapshot {
    pub table: Table,
    pub indexes: Vec<Index>,
    pub relations: Vec<Relation>,
}

/// Catalog facts a change may need beyond its own payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogFacts {
    /// Name of the live primary key constraint, when the engine names them.
    pub pk_constraint: Option<String>,
    /// Current definition of a table about to be dropped.
    pub snapshot: Option<TableSnapshot>,
    /// Columns covered by an index or foreign key (engines that cannot drop
    /// such columns in place).
    pub constrained_columns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_orders_reverse_statements() {
        let mut pair = DdlPair::new(vec![Statement::raw("A")], vec![Statement::raw("undo A")]);
        pair.extend(DdlPair::new(
            vec![Statement::raw("B")],
            vec![Statement::raw("undo B")],
        ));
        assert_eq!(pair.up, vec![Statement::raw("A"), Statement::raw("B")]);
        assert_eq!(
            pair.down,
            vec![Statement::raw("undo B"), Statement::raw("undo A")]
        );
    }

    #[test]
    fn test_change_deserializes_from_tagged_json() {
        let json = r#"{"op":"alter_table","table":"t",
            "columns":[{"cn":"id","dt":"int","pk":true}],
            "original":[{"cn":"id","dt":"int","pk":true}]}"#;
        let change: SchemaChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.operation(), "table_update");
        assert_eq!(change.table(), Some("t"));
    }

    #[test]
    fn test_rebuild_source_of() {
        let mut rebuild = TableRebuild::new("t");
        rebuild.renames.push(("uid".into(), "id".into()));
        assert_eq!(rebuild.source_of("uid"), "id");
        assert_eq!(rebuild.source_of("name"), "name");
    }
}
