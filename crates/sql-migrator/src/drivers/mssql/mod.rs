//! Microsoft SQL Server driver.
//!
//! This module provides MSSQL-specific implementations:
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlDriver`]: Introspection and transactional execution (`mssql` feature)
//! - [`MssqlAdmin`]: Database provisioning through `master` (`mssql` feature)

pub mod catalog;
mod dialect;
#[cfg(feature = "mssql")]
mod driver;

pub use dialect::{MssqlDialect, DEFAULT_SCHEMA};
#[cfg(feature = "mssql")]
pub use driver::{MssqlAdmin, MssqlDriver, TiberiusConnectionManager};
