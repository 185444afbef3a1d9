//! # sql-migrator
//!
//! Cross-dialect schema management library.
//!
//! This library introspects live databases and turns structural change
//! requests into reversible DDL, with support for:
//!
//! - **Introspection** of tables, columns, indexes, relations and objects
//! - **Reversible DDL** for MySQL, SQL Server, Oracle, Snowflake and SQLite
//! - **Table rebuilds** where the engine cannot alter columns in place
//! - **Migration units** stored as files or in a metadata database
//! - **An applied ledger** per database, updated in the same transaction
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_migrator::{AliasRegistry, Config, DriverCatalog, MigrateTarget, MigrationEngine};
//!
//! #[tokio::main]
//! async fn main() -> sql_migrator::Result<()> {
//!     let config = Arc::new(Config::load("config.yaml")?);
//!     let registry = Arc::new(AliasRegistry::new(config, Arc::new(DriverCatalog::with_builtins())));
//!     let engine = MigrationEngine::from_registry(registry).await?;
//!     let outcome = engine.migrate("main", MigrateTarget::Steps(usize::MAX)).await?;
//!     println!("Applied {} migrations", outcome.applied_titles.len());
//!     engine.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod error;
pub mod migrate;
pub mod telemetry;

// Re-exports for convenient access
pub use config::{Config, ConnectionConfig, DbType, MigrationsConfig, StoreKind};
pub use crate::core::{
    AliasRegistry, Column, DdlPair, DriverCatalog, Index, Relation, SchemaChange, Statement, Table,
    TableSchema,
};
pub use error::{MigrateError, OrderError, Result};
pub use migrate::{
    HealthCheckResult, InitOutcome, MigrateOutcome, MigrateTarget, MigrationEngine, MigrationUnit,
};
pub use telemetry::{ChannelSink, EventSink, NoopSink, TracingSink};
