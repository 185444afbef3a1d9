//! Oracle driver.
//!
//! - [`OracleDialect`]: SQL syntax strategy
//! - [`OracleDriver`]: Introspection and execution over ODBC (`odbc` feature)
//! - [`OracleAdmin`]: Schema listing; provisioning is not supported
//!
//! Oracle commits DDL implicitly, so a failing batch leaves earlier
//! statements in place.

pub mod catalog;
mod dialect;
#[cfg(feature = "odbc")]
mod driver;

pub use dialect::OracleDialect;
#[cfg(feature = "odbc")]
pub use driver::{OracleAdmin, OracleDriver};
