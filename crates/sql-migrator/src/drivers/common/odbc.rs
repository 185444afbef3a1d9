//! ODBC connection handling for the Oracle and Snowflake drivers.
//!
//! **Requirements:** the vendor ODBC driver must be installed and registered
//! with the driver manager (unixODBC on Linux/macOS):
//! - Oracle: Oracle Instant Client ODBC package
//! - Snowflake: `SnowflakeDSIIDriver`
//!
//! ODBC calls are blocking; a mutex serializes them per pool.

use std::sync::Arc;

use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::value::Record;
use crate::error::{MigrateError, Result};

/// Rows fetched per round trip.
const BATCH_SIZE: usize = 1000;

/// Upper bound for one text cell (definitions and LONG columns).
const MAX_CELL_LEN: usize = 65536;

/// Connection string plus a shared ODBC environment.
pub struct OdbcPool {
    env: Arc<Environment>,
    connection_string: String,
    label: &'static str,
    /// Mutex to serialize ODBC operations (ODBC is not thread-safe)
    conn_mutex: Mutex<()>,
}

impl OdbcPool {
    /// Create the environment and verify the connection string.
    pub async fn connect(connection_string: String, label: &'static str, target: &str) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            MigrateError::pool(
                format!(
                    "Failed to create ODBC environment: {}. Make sure the {} ODBC driver is installed.",
                    e, label
                ),
                "ODBC connection",
            )
        })?;

        debug!("ODBC connection to {} {} (credentials hidden)", label, target);

        // Test connection - use a scope so conn is dropped before we move env
        {
            let conn = env
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())
                .map_err(|e| {
                    MigrateError::Connection(format!(
                        "Failed to connect to {} via ODBC ({}): {}",
                        label, target, e
                    ))
                })?;
            conn.execute(probe_query(label), ())
                .map_err(|e| MigrateError::Connection(format!("{} probe failed: {}", label, e)))?;
        }

        info!("Connected to {} via ODBC: {}", label, target);

        Ok(Self {
            env: Arc::new(env),
            connection_string,
            label,
            conn_mutex: Mutex::new(()),
        })
    }

    /// Get a new ODBC connection.
    fn get_connection(&self) -> Result<odbc_api::Connection<'_>> {
        self.env
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())
            .map_err(|e| MigrateError::pool(format!("ODBC connection failed: {}", e), "getting ODBC connection"))
    }

    /// Execute a query and return rows as text records.
    fn query_sync(&self, sql: &str) -> Result<Vec<Record>> {
        let conn = self.get_connection()?;
        let mut records = Vec::new();

        let Some(mut cursor) = conn.execute(sql, ()).map_err(|e| {
            MigrateError::Introspection(format!("ODBC query failed: {} - SQL: {}", e, sql))
        })?
        else {
            return Ok(records);
        };

        let num_cols = cursor.num_result_cols().map_err(|e| {
            MigrateError::Introspection(format!("Failed to get column count: {}", e))
        })? as u16;
        let mut names = Vec::with_capacity(num_cols as usize);
        for col in 1..=num_cols {
            let name = cursor.col_name(col).map_err(|e| {
                MigrateError::Introspection(format!("Failed to get column name: {}", e))
            })?;
            names.push(name.to_lowercase());
        }
        let columns: Arc<[String]> = names.into();

        let mut buffers = TextRowSet::for_cursor(BATCH_SIZE, &mut cursor, Some(MAX_CELL_LEN))
            .map_err(|e| MigrateError::Introspection(format!("Failed to create row buffer: {}", e)))?;
        let mut row_cursor = cursor
            .bind_buffer(&mut buffers)
            .map_err(|e| MigrateError::Introspection(format!("Failed to bind buffer: {}", e)))?;

        while let Some(batch) = row_cursor
            .fetch()
            .map_err(|e| MigrateError::Introspection(format!("Failed to fetch rows: {}", e)))?
        {
            for row_idx in 0..batch.num_rows() {
                let values = (0..columns.len())
                    .map(|col_idx| {
                        batch
                            .at(col_idx, row_idx)
                            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                    })
                    .collect();
                records.push(Record::new(columns.clone(), values));
            }
        }

        Ok(records)
    }

    /// Run `statements` with autocommit off; commit at the end, roll back on failure.
    fn execute_batch_sync(&self, statements: &[String]) -> Result<()> {
        let conn = self.get_connection()?;
        conn.set_autocommit(false)
            .map_err(|e| MigrateError::pool(e, "disabling ODBC autocommit"))?;

        for sql in statements {
            debug!("Executing on {}: {}", self.label, sql);
            let started = std::time::Instant::now();
            if let Err(e) = conn.execute(sql, ()) {
                let err = MigrateError::ddl(sql.clone(), started.elapsed(), e);
                if let Err(re) = conn.rollback() {
                    tracing::warn!("{} rollback failed: {}", self.label, re);
                }
                return Err(err);
            }
        }

        conn.commit()
            .map_err(|e| MigrateError::pool(e, "committing ODBC transaction"))?;
        Ok(())
    }

    pub async fn query(&self, sql: &str) -> Result<Vec<Record>> {
        let _lock = self.conn_mutex.lock().await;
        self.query_sync(sql)
    }

    pub async fn execute_batch(&self, statements: &[String]) -> Result<()> {
        let _lock = self.conn_mutex.lock().await;
        self.execute_batch_sync(statements)
    }

    pub async fn test_connection(&self) -> Result<()> {
        self.query(probe_query(self.label)).await.map(|_| ())
    }
}

fn probe_query(label: &str) -> &'static str {
    if label.eq_ignore_ascii_case("oracle") {
        "SELECT 1 FROM DUAL"
    } else {
        "SELECT 1"
    }
}

/// Escape a value for an ODBC connection string attribute.
///
/// Values containing `;`, `{` or `}` are wrapped in braces with `}` doubled.
pub fn attribute(value: &str) -> String {
    if value.contains([';', '{', '}']) || value.starts_with(' ') || value.ends_with(' ') {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_escaping() {
        assert_eq!(attribute("plain"), "plain");
        assert_eq!(attribute("pa;ss"), "{pa;ss}");
        assert_eq!(attribute("a}b"), "{a}}b}");
    }

    #[test]
    fn test_probe_query() {
        assert_eq!(probe_query("Oracle"), "SELECT 1 FROM DUAL");
        assert_eq!(probe_query("Snowflake"), "SELECT 1");
    }
}
