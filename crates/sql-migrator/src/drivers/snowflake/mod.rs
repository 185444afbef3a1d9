//! Snowflake driver.
//!
//! - [`SnowflakeDialect`]: SQL syntax strategy
//! - [`SnowflakeDriver`]: Introspection and execution over ODBC (`odbc` feature)
//! - [`SnowflakeAdmin`]: Database provisioning (`odbc` feature)

pub mod catalog;
mod dialect;
#[cfg(feature = "odbc")]
mod driver;

pub use dialect::SnowflakeDialect;
#[cfg(feature = "odbc")]
pub use driver::{SnowflakeAdmin, SnowflakeDriver, DEFAULT_SCHEMA};
