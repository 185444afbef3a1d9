//! Table rebuild for SQLite.
//!
//! SQLite cannot change a primary key or add/drop a foreign key in place. The
//! rebuild creates `<table>__xc_new` with the target definition, copies rows,
//! drops the original, renames the copy and recreates indexes and triggers.
//! The driver runs the result with foreign key enforcement off.

use crate::core::change::{DdlPair, Plan, SchemaChange, TableRebuild};
use crate::core::schema::{Column, Index, IndexColumn, Relation, Table};
use crate::core::statement::Statement;
use crate::core::traits::Dialect;
use crate::ddl::objects::create_index_statement;
use crate::ddl::table::{auto_update_trigger, create_table};
use crate::error::{MigrateError, Result};

/// Catalog state of the table being rebuilt.
#[derive(Debug, Clone, Default)]
pub struct CurrentTable {
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub relations: Vec<Relation>,
    /// Stored `CREATE TRIGGER` text of user triggers.
    pub trigger_sql: Vec<String>,
}

impl CurrentTable {
    /// The table as `rebuild` leaves it.
    pub fn after(&self, rebuild: &TableRebuild) -> CurrentTable {
        let columns = resulting_columns(rebuild, &self.columns);
        CurrentTable {
            indexes: resulting_indexes(rebuild, &self.indexes, &columns),
            relations: resulting_relations(rebuild, &self.relations, &columns),
            trigger_sql: self.trigger_sql.clone(),
            columns,
        }
    }
}

pub fn temp_name(table: &str) -> String {
    format!("{}__xc_new", table)
}

fn same_relation(a: &Relation, b: &Relation) -> bool {
    a.column.eq_ignore_ascii_case(&b.column)
        && a.parent_table.eq_ignore_ascii_case(&b.parent_table)
        && a.parent_column.eq_ignore_ascii_case(&b.parent_column)
}

/// Name a current column carries in the rebuilt table.
fn target_of<'a>(rebuild: &'a TableRebuild, current: &'a str) -> &'a str {
    rebuild
        .renames
        .iter()
        .find(|(_, source)| source == current)
        .map(|(target, _)| target.as_str())
        .unwrap_or(current)
}

fn resulting_columns(rebuild: &TableRebuild, current: &[Column]) -> Vec<Column> {
    let mut columns = rebuild.columns.clone().unwrap_or_else(|| current.to_vec());
    if rebuild.columns.is_none() && !rebuild.new_pks.is_empty() {
        for col in &mut columns {
            col.primary_key = rebuild.new_pks.iter().any(|pk| *pk == col.name);
        }
    }
    for col in &mut columns {
        col.original_name = None;
    }
    columns
}

fn resulting_relations(rebuild: &TableRebuild, current: &[Relation], columns: &[Column]) -> Vec<Relation> {
    let mut relations: Vec<Relation> = current
        .iter()
        .filter(|r| !rebuild.drop_relations.iter().any(|d| same_relation(r, d)))
        .map(|r| Relation {
            column: target_of(rebuild, &r.column).to_string(),
            ..r.clone()
        })
        .collect();
    for added in &rebuild.add_relations {
        if !relations.iter().any(|r| same_relation(r, added)) {
            relations.push(added.clone());
        }
    }
    relations.retain(|r| columns.iter().any(|c| c.name == r.column));
    relations
}

fn resulting_indexes(rebuild: &TableRebuild, current: &[Index], columns: &[Column]) -> Vec<Index> {
    current
        .iter()
        .filter(|i| !i.primary && !i.name.starts_with("sqlite_autoindex"))
        .filter_map(|index| {
            let mapped: Vec<IndexColumn> = index
                .columns
                .iter()
                .map(|c| IndexColumn {
                    name: target_of(rebuild, &c.name).to_string(),
                    seq: c.seq,
                })
                .collect();
            let complete = mapped.iter().all(|m| columns.iter().any(|c| c.name == m.name));
            complete.then(|| Index {
                table: rebuild.table.clone(),
                columns: mapped,
                ..index.clone()
            })
        })
        .collect()
}

/// Statements that rebuild `rebuild.table` from `current` into its target shape.
pub fn expand(d: &dyn Dialect, rebuild: &TableRebuild, current: &CurrentTable) -> Result<Vec<Statement>> {
    if current.columns.is_empty() {
        return Err(MigrateError::table_not_found(&rebuild.table));
    }
    let table = rebuild.table.as_str();
    let temp = temp_name(table);
    let columns = resulting_columns(rebuild, &current.columns);
    let relations = resulting_relations(rebuild, &current.relations, &columns);
    let indexes = resulting_indexes(rebuild, &current.indexes, &columns);

    let mut out = Vec::new();

    // Triggers are recreated once the table has its final name
    let plain: Vec<Column> = columns
        .iter()
        .cloned()
        .map(|mut c| {
            c.auto_update = false;
            c
        })
        .collect();
    out.extend(create_table(d, &Table::new(&temp, plain), &relations)?.up);

    let copied: Vec<(&str, &str)> = columns
        .iter()
        .map(|c| (c.name.as_str(), rebuild.source_of(&c.name)))
        .filter(|(_, source)| current.columns.iter().any(|c| c.name == *source))
        .collect();
    if !copied.is_empty() {
        let targets: Vec<&str> = copied.iter().map(|(t, _)| *t).collect();
        let sources: Vec<&str> = copied.iter().map(|(_, s)| *s).collect();
        out.push(
            d.builder()
                .raw("INSERT INTO ")
                .ident(&temp)
                .raw(" (")
                .idents(&targets)
                .raw(") SELECT ")
                .idents(&sources)
                .raw(" FROM ")
                .ident(table)
                .build()?,
        );
    }

    out.push(d.builder().raw("DROP TABLE ").ident(table).build()?);
    out.push(
        d.builder()
            .raw("ALTER TABLE ")
            .ident(&temp)
            .raw(" RENAME TO ")
            .ident(table)
            .build()?,
    );

    for index in &indexes {
        out.push(create_index_statement(d, index)?);
    }

    let first_pk = columns.iter().find(|c| c.primary_key).map(|c| c.name.as_str());
    for col in columns.iter().filter(|c| c.auto_update) {
        if let Some(trigger) = auto_update_trigger(d, table, &col.name, first_pk)? {
            out.extend(trigger.up);
        }
    }
    for sql in &current.trigger_sql {
        out.push(Statement::raw(sql.clone()));
    }

    Ok(out)
}

/// Expand both rebuilds of `plan`.
///
/// The forward rebuild runs against `current`. The reverse one runs after the
/// forward DDL, so it is expanded against the table that DDL leaves behind.
pub fn expand_plan(
    d: &dyn Dialect,
    change: &SchemaChange,
    plan: Plan,
    current: &CurrentTable,
) -> Result<DdlPair> {
    let mut ddl = plan.ddl;
    let after = match (&plan.rebuild_up, change) {
        (Some(up), _) => {
            ddl.up.extend(expand(d, up, current)?);
            current.after(up)
        }
        (None, SchemaChange::AlterTable { table, columns, .. }) => {
            let mut edited = TableRebuild::new(table.as_str());
            edited.columns = Some(columns.clone());
            edited.renames = columns
                .iter()
                .filter(|c| c.identity() != c.name)
                .map(|c| (c.name.clone(), c.identity().to_string()))
                .collect();
            current.after(&edited)
        }
        (None, _) => current.clone(),
    };
    if let Some(down) = &plan.rebuild_down {
        ddl.down.extend(expand(d, down, &after)?);
    }
    Ok(ddl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sqlite::SqliteDialect;

    fn current() -> CurrentTable {
        CurrentTable {
            columns: vec![
                Column::new("id", "integer").primary_key().auto_increment(),
                Column::new("name", "varchar").with_precision("50"),
                Column::new("team_id", "integer"),
            ],
            indexes: vec![
                Index::new("idx_name", "users", &["name"], false),
                Index::new("sqlite_autoindex_users_1", "users", &["id"], true),
            ],
            relations: vec![Relation::new("users", "team_id", "teams", "id")],
            trigger_sql: vec!["CREATE TRIGGER trg AFTER INSERT ON users BEGIN SELECT 1; END".into()],
        }
    }

    fn sql(statements: &[Statement]) -> Vec<String> {
        statements.iter().map(|s| s.sql().to_string()).collect()
    }

    #[test]
    fn test_rename_maps_copy_and_indexes() {
        let d = SqliteDialect::default();
        let mut rebuild = TableRebuild::new("users");
        rebuild.columns = Some(vec![
            Column::new("id", "integer").primary_key().auto_increment(),
            Column::new("label", "varchar").with_precision("50"),
            Column::new("team_id", "integer"),
        ]);
        rebuild.renames.push(("label".into(), "name".into()));

        let out = sql(&expand(&d, &rebuild, &current()).unwrap());
        assert!(out[0].starts_with("CREATE TABLE \"users__xc_new\""));
        assert!(out[0].contains("FOREIGN KEY (\"team_id\") REFERENCES \"teams\""));
        assert_eq!(
            out[1],
            "INSERT INTO \"users__xc_new\" (\"id\", \"label\", \"team_id\") SELECT \"id\", \"name\", \"team_id\" FROM \"users\""
        );
        assert_eq!(out[2], "DROP TABLE \"users\"");
        assert_eq!(out[3], "ALTER TABLE \"users__xc_new\" RENAME TO \"users\"");
        assert!(out[4].contains("\"idx_name\" ON \"users\" (\"label\")"));
        assert!(!out.iter().any(|s| s.contains("sqlite_autoindex")));
        assert!(out.last().unwrap().starts_with("CREATE TRIGGER trg"));
    }

    #[test]
    fn test_drop_relation_and_dropped_column_index() {
        let d = SqliteDialect::default();
        let mut rebuild = TableRebuild::new("users");
        rebuild.columns = Some(vec![
            Column::new("id", "integer").primary_key().auto_increment(),
            Column::new("team_id", "integer"),
        ]);
        rebuild.drop_relations.push(Relation::new("users", "team_id", "teams", "id"));

        let out = sql(&expand(&d, &rebuild, &current()).unwrap());
        assert!(!out[0].contains("FOREIGN KEY"));
        assert!(out[1].contains("SELECT \"id\", \"team_id\" FROM"));
        assert!(!out.iter().any(|s| s.contains("idx_name")));
    }

    #[test]
    fn test_added_relation_keeps_current_columns() {
        let d = SqliteDialect::default();
        let mut rebuild = TableRebuild::new("users");
        let mut rel = Relation::new("users", "team_id", "teams", "id");
        rel.name = Some("fk_team".into());
        rebuild.add_relations.push(rel);

        let mut state = current();
        state.relations.clear();
        let out = sql(&expand(&d, &rebuild, &state).unwrap());
        assert!(out[0].contains("CONSTRAINT \"fk_team\" FOREIGN KEY (\"team_id\")"));
        assert!(out[1].contains("(\"id\", \"name\", \"team_id\")"));
    }

    #[test]
    fn test_auto_update_trigger_recreated_after_rename() {
        let d = SqliteDialect::default();
        let mut state = current();
        state.columns.push(Column::new("updated_at", "datetime").auto_update());
        let rebuild = TableRebuild::new("users");

        let out = sql(&expand(&d, &rebuild, &state).unwrap());
        assert!(!out[0].contains("xc_trigger_"));
        let rename_at = out.iter().position(|s| s.contains("RENAME TO")).unwrap();
        let trigger_at = out
            .iter()
            .position(|s| s.contains("xc_trigger_users_updated_at"))
            .unwrap();
        assert!(trigger_at > rename_at);
    }

    #[test]
    fn test_reverse_rebuild_reads_renamed_columns() {
        let d = SqliteDialect::new(false);
        let original = current().columns;
        let mut columns = original.clone();
        columns[1] = columns[1].clone().renamed("label");
        let change = SchemaChange::AlterTable {
            table: "users".into(),
            columns: columns.clone(),
            original: original.clone(),
        };
        let facts = crate::core::change::CatalogFacts {
            constrained_columns: vec!["name".into(), "team_id".into()],
            ..Default::default()
        };
        let plan = crate::ddl::table::alter_table(&d, "users", &columns, &original, &facts).unwrap();
        let ddl = expand_plan(&d, &change, plan, &current()).unwrap();

        let up = sql(&ddl.up);
        assert!(up[1].ends_with("SELECT \"id\", \"name\", \"team_id\" FROM \"users\""));
        assert!(up.iter().any(|s| s.contains("\"idx_name\" ON \"users\" (\"label\")")));

        let down = sql(&ddl.down);
        assert_eq!(
            down[1],
            "INSERT INTO \"users__xc_new\" (\"id\", \"name\", \"team_id\") SELECT \"id\", \"label\", \"team_id\" FROM \"users\""
        );
        assert!(down[0].contains("FOREIGN KEY (\"team_id\") REFERENCES \"teams\""));
        assert!(down.iter().any(|s| s.contains("\"idx_name\" ON \"users\" (\"name\")")));
    }

    #[test]
    fn test_after_maps_indexes_through_renames() {
        let mut rebuild = TableRebuild::new("users");
        rebuild.renames.push(("label".into(), "name".into()));
        rebuild.columns = Some(vec![
            Column::new("id", "integer").primary_key().auto_increment(),
            Column::new("label", "varchar").with_precision("50"),
        ]);
        let after = current().after(&rebuild);
        assert_eq!(after.columns.len(), 2);
        assert_eq!(after.indexes.len(), 1);
        assert_eq!(after.indexes[0].column_names(), vec!["label"]);
        assert!(after.relations.is_empty());
    }

    #[test]
    fn test_missing_table_is_rejected() {
        let d = SqliteDialect::default();
        let err = expand(&d, &TableRebuild::new("ghost"), &CurrentTable::default()).unwrap_err();
        assert!(matches!(err, MigrateError::TableNotFound(_)));
    }
}
