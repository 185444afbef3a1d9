//! Per-alias driver registry.
//!
//! Drivers are opened on first use and shared afterwards. Each alias maps to
//! exactly one live driver until [`AliasRegistry::close_all`] runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{Config, ConnectionConfig};
use crate::error::Result;

use super::catalog::DriverCatalog;
use super::traits::{AdminHandle, Driver};

/// Lazily connected drivers keyed by alias.
pub struct AliasRegistry {
    config: Arc<Config>,
    catalog: Arc<DriverCatalog>,
    drivers: Mutex<HashMap<String, Arc<dyn Driver>>>,
}

impl AliasRegistry {
    pub fn new(config: Arc<Config>, catalog: Arc<DriverCatalog>) -> Self {
        Self {
            config,
            catalog,
            drivers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Configured aliases in name order.
    pub fn aliases(&self) -> Vec<String> {
        self.config.connections.keys().cloned().collect()
    }

    pub fn connection(&self, alias: &str) -> Result<&ConnectionConfig> {
        self.config.connection(alias)
    }

    /// Deadline for driver calls on `alias`.
    pub fn timeout(&self, alias: &str) -> Option<Duration> {
        self.config
            .connections
            .get(alias)
            .and_then(ConnectionConfig::statement_timeout)
    }

    /// Driver for `alias`, connecting on first use.
    pub async fn driver(&self, alias: &str) -> Result<Arc<dyn Driver>> {
        let mut drivers = self.drivers.lock().await;
        if let Some(driver) = drivers.get(alias) {
            return Ok(driver.clone());
        }
        let conn = self.config.connection(alias)?;
        debug!("Opening driver for alias '{}' ({})", alias, conn.r#type);
        let driver = self.catalog.connect(conn, &self.config.migrations).await?;
        drivers.insert(alias.to_string(), driver.clone());
        Ok(driver)
    }

    /// Register an already open driver under `alias`.
    pub async fn insert(&self, alias: impl Into<String>, driver: Arc<dyn Driver>) {
        self.drivers.lock().await.insert(alias.into(), driver);
    }

    /// Fresh admin handle for `alias`; callers close it when done.
    pub async fn admin(&self, alias: &str) -> Result<Arc<dyn AdminHandle>> {
        let conn = self.config.connection(alias)?;
        self.catalog.connect_admin(conn).await
    }

    /// Close and forget the driver of `alias`, if open.
    pub async fn release(&self, alias: &str) {
        let driver = self.drivers.lock().await.remove(alias);
        if let Some(driver) = driver {
            driver.close().await;
        }
    }

    pub async fn close_all(&self) {
        let drivers: Vec<(String, Arc<dyn Driver>)> = self.drivers.lock().await.drain().collect();
        for (alias, driver) in drivers {
            driver.close().await;
            info!("Closed driver for alias '{}'", alias);
        }
    }
}
