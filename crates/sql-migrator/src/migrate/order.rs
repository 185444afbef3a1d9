//! Ordering units against the applied ledger.
//!
//! Pure selection logic: given the stored units and the applied rows, decide
//! which units an `up` or `down` touches. Nothing here talks to a database.

use serde::Serialize;

use crate::error::{OrderError, Result};

use super::ledger::AppliedMigration;
use super::title;
use super::unit::MigrationUnit;

/// What an `up`, `down` or listing should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrateTarget {
    /// At most this many units.
    Steps(usize),
    /// Up to and including the unit with this title.
    Until(String),
    /// Select nothing; only report.
    ListOnly,
}

impl MigrateTarget {
    /// Accept an `Until` title given as a bare stem or with either suffix.
    pub fn normalized(self) -> Result<Self> {
        match self {
            MigrateTarget::Until(title) => Ok(MigrateTarget::Until(title::normalize(&title)?)),
            other => Ok(other),
        }
    }
}

/// One unit in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedUnit {
    pub title: String,
    pub title_down: String,
    /// Applied before the operation ran.
    pub applied: bool,
    /// Touched by the operation.
    pub selected: bool,
}

/// Result of `migrate`, `migrations_up`, `migrations_down` and listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MigrateOutcome {
    /// Units not applied before the operation ran.
    pub pending: usize,
    /// Titles applied or reverted, in execution order.
    pub applied_titles: Vec<String>,
    pub listing: Vec<ListedUnit>,
}

/// Units selected by an operation, as indexes into the unit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// In execution order.
    pub indexes: Vec<usize>,
    pub outcome: MigrateOutcome,
}

/// Number of leading units the ledger covers.
///
/// The ledger is a prefix of the unit list: its last title must be a unit
/// and it cannot hold more rows than there are units.
fn applied_prefix(units: &[MigrationUnit], applied: &[AppliedMigration]) -> Result<usize> {
    let dirty = || OrderError::Dirty {
        units: units.len(),
        applied: applied.len(),
    };
    if applied.len() > units.len() {
        return Err(dirty().into());
    }
    let Some(last) = applied.last() else {
        return Ok(0);
    };
    let position = units
        .iter()
        .position(|u| u.title == last.title)
        .ok_or_else(dirty)?;
    Ok(position + 1)
}

fn listing(units: &[MigrationUnit], prefix: usize, selected: &[usize]) -> Vec<ListedUnit> {
    units
        .iter()
        .enumerate()
        .map(|(i, u)| ListedUnit {
            title: u.title.clone(),
            title_down: u.title_down.clone(),
            applied: i < prefix,
            selected: selected.contains(&i),
        })
        .collect()
}

/// Select the units an `up` applies.
pub fn select_up(
    units: &[MigrationUnit],
    applied: &[AppliedMigration],
    target: &MigrateTarget,
) -> Result<Selection> {
    let prefix = applied_prefix(units, applied)?;
    let pending = units.len() - prefix;
    let remaining = &units[prefix..];

    let count = match target {
        MigrateTarget::ListOnly => 0,
        MigrateTarget::Steps(n) => (*n).min(pending),
        MigrateTarget::Until(title) => {
            remaining
                .iter()
                .position(|u| &u.title == title)
                .ok_or_else(|| OrderError::NotFound(title.clone()))?
                + 1
        }
    };

    let indexes: Vec<usize> = (prefix..prefix + count).collect();
    Ok(Selection {
        outcome: MigrateOutcome {
            pending,
            applied_titles: indexes.iter().map(|&i| units[i].title.clone()).collect(),
            listing: listing(units, prefix, &indexes),
        },
        indexes,
    })
}

/// Select the units a `down` reverts, newest first.
pub fn select_down(
    units: &[MigrationUnit],
    applied: &[AppliedMigration],
    target: &MigrateTarget,
) -> Result<Selection> {
    let prefix = applied_prefix(units, applied)?;

    let count = match target {
        MigrateTarget::ListOnly => 0,
        MigrateTarget::Steps(n) => (*n).min(prefix),
        MigrateTarget::Until(title) => {
            units[..prefix]
                .iter()
                .rev()
                .position(|u| &u.title == title)
                .ok_or_else(|| OrderError::NotFound(title.clone()))?
                + 1
        }
    };

    let indexes: Vec<usize> = (prefix - count..prefix).rev().collect();
    Ok(Selection {
        outcome: MigrateOutcome {
            pending: units.len() - prefix,
            applied_titles: indexes.iter().map(|&i| units[i].title.clone()).collect(),
            listing: listing(units, prefix, &indexes),
        },
        indexes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;

    fn units(n: usize) -> Vec<MigrationUnit> {
        (0..n)
            .map(|i| MigrationUnit::new("main", &format!("20240309_1230050{:02}_aaaaaa", i)))
            .collect()
    }

    fn applied(units: &[MigrationUnit], n: usize) -> Vec<AppliedMigration> {
        units[..n]
            .iter()
            .map(|u| AppliedMigration {
                title: u.title.clone(),
                title_down: u.title_down.clone(),
                description: None,
                batch: 1,
                checksum: None,
                status: "applied".into(),
            })
            .collect()
    }

    // =========================================================================
    // up
    // =========================================================================

    #[test]
    fn test_up_nothing_pending() {
        let units = units(3);
        let sel = select_up(&units, &applied(&units, 3), &MigrateTarget::Steps(5)).unwrap();
        assert!(sel.indexes.is_empty());
        assert_eq!(sel.outcome.pending, 0);
        assert!(sel.outcome.listing.iter().all(|l| l.applied && !l.selected));
    }

    #[test]
    fn test_up_steps_start_after_last_applied() {
        let units = units(5);
        let sel = select_up(&units, &applied(&units, 2), &MigrateTarget::Steps(2)).unwrap();
        assert_eq!(sel.indexes, vec![2, 3]);
        assert_eq!(sel.outcome.pending, 3);
        assert_eq!(sel.outcome.applied_titles[0], units[2].title);

        let all = select_up(&units, &applied(&units, 2), &MigrateTarget::Steps(99)).unwrap();
        assert_eq!(all.indexes, vec![2, 3, 4]);
    }

    #[test]
    fn test_up_until_includes_target() {
        let units = units(4);
        let target = MigrateTarget::Until(units[2].title.clone());
        let sel = select_up(&units, &applied(&units, 0), &target).unwrap();
        assert_eq!(sel.indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_up_until_applied_or_unknown_is_not_found() {
        let units = units(4);
        let done = applied(&units, 2);
        for title in [units[1].title.clone(), "nope".to_string()] {
            let err = select_up(&units, &done, &MigrateTarget::Until(title.clone())).unwrap_err();
            assert!(matches!(err, MigrateError::MigrationOrder(OrderError::NotFound(t)) if t == title));
        }
    }

    #[test]
    fn test_more_applied_than_units_is_dirty() {
        let all = units(3);
        let ledger = applied(&all, 3);
        let err = select_up(&all[..2], &ledger, &MigrateTarget::ListOnly).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::MigrationOrder(OrderError::Dirty { units: 2, applied: 3 })
        ));
        assert_eq!(err.exit_code(), 8);
    }

    #[test]
    fn test_unknown_last_applied_is_dirty() {
        let all = units(3);
        let mut ledger = applied(&all, 1);
        ledger[0].title = "20200101_000000000_zzzzzz.up.sql".into();
        assert!(select_up(&all, &ledger, &MigrateTarget::ListOnly).is_err());
    }

    #[test]
    fn test_list_only_selects_nothing() {
        let units = units(3);
        let sel = select_up(&units, &applied(&units, 1), &MigrateTarget::ListOnly).unwrap();
        assert!(sel.indexes.is_empty());
        assert_eq!(sel.outcome.pending, 2);
        let flags: Vec<bool> = sel.outcome.listing.iter().map(|l| l.applied).collect();
        assert_eq!(flags, vec![true, false, false]);
    }

    // =========================================================================
    // down
    // =========================================================================

    #[test]
    fn test_down_steps_newest_first() {
        let units = units(4);
        let sel = select_down(&units, &applied(&units, 3), &MigrateTarget::Steps(2)).unwrap();
        assert_eq!(sel.indexes, vec![2, 1]);
        assert_eq!(sel.outcome.pending, 1);

        let capped = select_down(&units, &applied(&units, 1), &MigrateTarget::Steps(5)).unwrap();
        assert_eq!(capped.indexes, vec![0]);
    }

    #[test]
    fn test_down_until_includes_target() {
        let units = units(4);
        let target = MigrateTarget::Until(units[1].title.clone());
        let sel = select_down(&units, &applied(&units, 4), &target).unwrap();
        assert_eq!(sel.indexes, vec![3, 2, 1]);
    }

    #[test]
    fn test_down_until_pending_is_not_found() {
        let units = units(4);
        let target = MigrateTarget::Until(units[3].title.clone());
        let err = select_down(&units, &applied(&units, 2), &target).unwrap_err();
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_until_stem_is_normalized() {
        let units = units(3);
        let stem = units[1].stem().to_string();
        let target = MigrateTarget::Until(stem).normalized().unwrap();
        assert_eq!(target, MigrateTarget::Until(units[1].title.clone()));
        let sel = select_up(&units, &[], &target).unwrap();
        assert_eq!(sel.indexes, vec![0, 1]);

        let down = MigrateTarget::Until(units[1].title_down.clone()).normalized().unwrap();
        assert_eq!(down, MigrateTarget::Until(units[1].title.clone()));
        assert_eq!(MigrateTarget::Steps(2).normalized().unwrap(), MigrateTarget::Steps(2));
    }

    #[test]
    fn test_malformed_until_is_config_error() {
        let err = MigrateTarget::Until("latest".into()).normalized().unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }
}
