//! Core abstractions for database-agnostic schema management.
//!
//! - [`schema`]: Table, column, index, relation and object metadata types
//! - [`change`]: Schema change requests, DDL pairs and plans
//! - [`diff`]: Column-list diffing
//! - [`identifier`]: Identifier validation and quoting
//! - [`statement`]: Statements, the statement builder and sanitizers
//! - [`value`]: Text records returned by catalog queries
//! - [`traits`]: `Dialect`, `Driver` and `AdminHandle`
//! - [`catalog`]: Driver factories for dependency injection
//! - [`registry`]: Lazily opened drivers per alias
//!
//! # Design Patterns
//!
//! - **Abstract Factory**: `DriverCatalog` opens drivers and admin handles per engine
//! - **Strategy**: `Dialect` plugs syntax into the shared DDL generator
//! - **Template Method**: default `Driver` methods define the planning skeleton

pub mod catalog;
pub mod change;
pub mod diff;
pub mod identifier;
pub mod registry;
pub mod schema;
pub mod statement;
pub mod traits;
pub mod value;

pub use catalog::{DriverCatalog, DriverFactory};
pub use change::{CatalogFacts, DdlPair, Plan, SchemaChange, TableRebuild, TableSnapshot};
pub use registry::AliasRegistry;
pub use schema::{Column, Index, Relation, Routine, Sequence, Table, TableSchema, Trigger, View};
pub use statement::{Statement, StatementBuilder};
pub use traits::{bounded, AdminHandle, Dialect, Driver, SyntaxTable};
pub use value::Record;
