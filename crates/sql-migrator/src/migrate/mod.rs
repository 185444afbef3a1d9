//! Reversible migrations and their ledgers.
//!
//! - [`title`]: Sortable unit titles
//! - [`unit`]: Migration units and their text format
//! - [`store`]: Where units live (files or a metadata database)
//! - [`ledger`]: The applied ledger inside each target database
//! - [`order`]: Selecting units for `up` and `down`
//! - [`engine`]: The operations that tie them together

pub mod engine;
pub mod ledger;
pub mod order;
pub mod store;
pub mod title;
pub mod unit;

pub use engine::{AliasHealth, HealthCheckResult, InitOutcome, MigrationEngine};
pub use ledger::{AppliedMigration, EvolutionLedger};
pub use order::{ListedUnit, MigrateOutcome, MigrateTarget};
pub use store::{DbLedgerStore, FsLedgerStore, LedgerStore};
pub use title::TitleGenerator;
pub use unit::{MigrationUnit, UnitState};
