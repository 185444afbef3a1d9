//! SQLite and libSQL driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy
//! - [`SqliteDriver`]: Introspection, table rebuilds and transactional
//!   execution (`sqlite` feature)
//! - [`SqliteAdmin`]: Database file provisioning (`sqlite` feature)
//!
//! libSQL databases are opened as SQLite files; the libSQL dialect only
//! differs in hiding its bookkeeping tables.

pub mod catalog;
mod dialect;
#[cfg(feature = "sqlite")]
mod driver;
pub mod rebuild;

pub use dialect::SqliteDialect;
#[cfg(feature = "sqlite")]
pub use driver::{SqliteAdmin, SqliteDriver};
