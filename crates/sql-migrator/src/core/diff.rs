//! Column list diffing.
//!
//! [`diff_columns`] pairs the edited column list with the introspected one by
//! column identity (the name before any pending rename) and classifies every
//! column as added, removed, modified or unchanged. The primary key is compared
//! separately as an ordered list. The result is a pure value that DDL
//! generation consumes; nothing here touches a connection.

use super::schema::Column;
use serde::{Deserialize, Serialize};

/// Classification of one column between two versions of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ColumnChange {
    Added(Column),
    Removed(Column),
    Modified { old: Column, new: Column },
    Unchanged(Column),
}

impl ColumnChange {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ColumnChange::Unchanged(_))
    }

    /// The change that undoes this one.
    pub fn inverse(&self) -> ColumnChange {
        match self {
            ColumnChange::Added(c) => ColumnChange::Removed(c.clone()),
            ColumnChange::Removed(c) => ColumnChange::Added(c.clone()),
            ColumnChange::Modified { old, new } => ColumnChange::Modified {
                old: new.clone(),
                new: old.clone(),
            },
            ColumnChange::Unchanged(c) => ColumnChange::Unchanged(c.clone()),
        }
    }
}

/// Primary key change between two column lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PkDiff {
    /// Key columns before the change, in key order.
    pub old: Vec<String>,
    /// Key columns after the change, in key order.
    pub new: Vec<String>,
    /// Former key columns that are removed by the change.
    pub dropped: Vec<String>,
}

impl PkDiff {
    pub fn is_changed(&self) -> bool {
        self.old != self.new || !self.dropped.is_empty()
    }
}

/// Result of diffing a table's columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColumnDiff {
    /// Removed columns first (in original order), then the new list in order.
    pub changes: Vec<ColumnChange>,
    /// Present only when the key changed.
    pub pk: Option<PkDiff>,
}

impl ColumnDiff {
    /// True when no column or key change is present.
    pub fn is_empty(&self) -> bool {
        self.pk.is_none() && self.changes.iter().all(ColumnChange::is_unchanged)
    }

    pub fn added(&self) -> impl Iterator<Item = &Column> {
        self.changes.iter().filter_map(|c| match c {
            ColumnChange::Added(col) => Some(col),
            _ => None,
        })
    }

    pub fn removed(&self) -> impl Iterator<Item = &Column> {
        self.changes.iter().filter_map(|c| match c {
            ColumnChange::Removed(col) => Some(col),
            _ => None,
        })
    }

    /// The diff that undoes this one.
    pub fn inverse(&self) -> ColumnDiff {
        let mut removed = Vec::new();
        let mut rest = Vec::new();
        for change in &self.changes {
            match change.inverse() {
                c @ ColumnChange::Removed(_) => removed.push(c),
                c => rest.push(c),
            }
        }
        removed.extend(rest);

        let pk = self.pk.as_ref().map(|pk| PkDiff {
            old: pk.new.clone(),
            new: pk.old.clone(),
            dropped: self
                .added()
                .filter(|c| c.primary_key)
                .map(|c| c.name.clone())
                .collect(),
        });

        ColumnDiff { changes: removed, pk }
    }

    /// Column list after the change is applied, in order.
    pub fn resulting_columns(&self) -> Vec<Column> {
        self.changes
            .iter()
            .filter_map(|c| match c {
                ColumnChange::Added(col) | ColumnChange::Unchanged(col) => Some(col.clone()),
                ColumnChange::Modified { new, .. } => Some(new.clone()),
                ColumnChange::Removed(_) => None,
            })
            .collect()
    }
}

/// Diff `new` against `original`.
///
/// A column in `new` is paired with the original column whose name equals its
/// identity (`original_name` when renamed, otherwise `name`).
pub fn diff_columns(new: &[Column], original: &[Column]) -> ColumnDiff {
    let mut changes = Vec::with_capacity(new.len() + original.len());

    for old in original {
        if !new.iter().any(|n| n.identity() == old.name) {
            changes.push(ColumnChange::Removed(old.clone()));
        }
    }

    for col in new {
        match original.iter().find(|o| o.name == col.identity()) {
            None => changes.push(ColumnChange::Added(col.clone())),
            Some(old) if old.same_definition(col) => {
                changes.push(ColumnChange::Unchanged(col.clone()))
            }
            Some(old) => changes.push(ColumnChange::Modified {
                old: old.clone(),
                new: col.clone(),
            }),
        }
    }

    let pk = diff_primary_key(new, original);
    ColumnDiff { changes, pk }
}

/// Compare ordered primary key lists; removed columns never count as new keys.
pub fn diff_primary_key(new: &[Column], original: &[Column]) -> Option<PkDiff> {
    let new_pks: Vec<String> = new
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.clone())
        .collect();
    let old_pks: Vec<String> = original
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.clone())
        .collect();

    // A renamed key column keeps its key position.
    let renamed_old: Vec<String> = old_pks
        .iter()
        .map(|old| {
            new.iter()
                .find(|n| n.identity() == old)
                .map(|n| n.name.clone())
                .unwrap_or_else(|| old.clone())
        })
        .collect();

    let dropped: Vec<String> = old_pks
        .iter()
        .filter(|old| !new.iter().any(|n| n.identity() == old.as_str()))
        .cloned()
        .collect();

    let diff = PkDiff {
        old: old_pks,
        new: new_pks,
        dropped,
    };
    if renamed_old == diff.new && diff.dropped.is_empty() {
        None
    } else {
        Some(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Vec<Column> {
        vec![
            Column::new("id", "int").primary_key().auto_increment(),
            Column::new("name", "varchar").with_precision("50"),
            Column::new("age", "int"),
        ]
    }

    // =========================================================================
    // Classification tests
    // =========================================================================

    #[test]
    fn test_identical_lists_produce_empty_diff() {
        let diff = diff_columns(&base(), &base());
        assert!(diff.is_empty());
        assert!(diff.pk.is_none());
        assert_eq!(diff.changes.len(), 3);
    }

    #[test]
    fn test_added_and_removed() {
        let mut new = base();
        new.retain(|c| c.name != "age");
        new.push(Column::new("email", "varchar").with_precision("255"));

        let diff = diff_columns(&new, &base());
        assert!(matches!(&diff.changes[0], ColumnChange::Removed(c) if c.name == "age"));
        assert_eq!(diff.added().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["email"]);
        assert!(diff.pk.is_none());
    }

    #[test]
    fn test_single_attribute_is_modified() {
        let mut new = base();
        new[1].required = true;
        let diff = diff_columns(&new, &base());
        let modified: Vec<_> = diff
            .changes
            .iter()
            .filter(|c| matches!(c, ColumnChange::Modified { .. }))
            .collect();
        assert_eq!(modified.len(), 1);
        if let ColumnChange::Modified { old, new } = modified[0] {
            assert!(!old.required);
            assert!(new.required);
        }
    }

    #[test]
    fn test_rename_pairs_by_identity() {
        let mut new = base();
        new[1] = new[1].clone().renamed("full_name");
        let diff = diff_columns(&new, &base());
        assert_eq!(diff.removed().count(), 0);
        assert_eq!(diff.added().count(), 0);
        assert!(diff
            .changes
            .iter()
            .any(|c| matches!(c, ColumnChange::Modified { old, new } if old.name == "name" && new.name == "full_name")));
    }

    // =========================================================================
    // Primary key tests
    // =========================================================================

    #[test]
    fn test_pk_added_column() {
        let mut new = base();
        new[1].primary_key = true;
        let diff = diff_columns(&new, &base());
        let pk = diff.pk.unwrap();
        assert_eq!(pk.old, vec!["id"]);
        assert_eq!(pk.new, vec!["id", "name"]);
        assert!(pk.dropped.is_empty());
    }

    #[test]
    fn test_pk_reordering_counts_as_change() {
        let original = vec![
            Column::new("a", "int").primary_key(),
            Column::new("b", "int").primary_key(),
        ];
        let new = vec![
            Column::new("b", "int").primary_key(),
            Column::new("a", "int").primary_key(),
        ];
        assert!(diff_primary_key(&new, &original).is_some());
    }

    #[test]
    fn test_pk_removed_column_is_dropped() {
        let new = vec![Column::new("name", "varchar")];
        let original = vec![Column::new("id", "int").primary_key(), Column::new("name", "varchar")];
        let pk = diff_primary_key(&new, &original).unwrap();
        assert_eq!(pk.dropped, vec!["id"]);
        assert!(pk.new.is_empty());
    }

    #[test]
    fn test_pk_rename_is_not_a_key_change() {
        let original = vec![Column::new("id", "int").primary_key()];
        let new = vec![Column::new("id", "int").primary_key().renamed("uid")];
        assert!(diff_primary_key(&new, &original).is_none());
    }

    // =========================================================================
    // Inverse tests
    // =========================================================================

    #[test]
    fn test_inverse_swaps_direction() {
        let mut new = base();
        new.retain(|c| c.name != "age");
        new.push(Column::new("email", "varchar"));
        new[1].required = true;

        let diff = diff_columns(&new, &base());
        let inverse = diff.inverse();
        assert!(matches!(&inverse.changes[0], ColumnChange::Removed(c) if c.name == "email"));
        assert!(inverse.added().any(|c| c.name == "age"));
        assert!(inverse.changes.iter().any(
            |c| matches!(c, ColumnChange::Modified { old, new } if old.required && !new.required)
        ));
    }

    #[test]
    fn test_resulting_columns() {
        let mut new = base();
        new.retain(|c| c.name != "age");
        let diff = diff_columns(&new, &base());
        let names: Vec<_> = diff.resulting_columns().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["id", "name"]);
    }
}
