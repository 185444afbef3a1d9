//! MySQL/MariaDB/TiDB database driver.
//!
//! This module provides MySQL-specific implementations for:
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlDriver`]: Introspection and transactional execution
//! - [`MysqlAdmin`]: Database provisioning
//!
//! # Feature Flag
//!
//! The driver is only available when the `mysql` feature is enabled; the
//! dialect and catalog parsers are always compiled so plans can be rendered
//! offline.
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+
//! - TiDB 6+

pub mod catalog;
mod dialect;
#[cfg(feature = "mysql")]
mod driver;

pub use dialect::MysqlDialect;
#[cfg(feature = "mysql")]
pub use driver::{MysqlAdmin, MysqlDriver};
