//! # Catalog Refresh
//!
//! Pulls the product catalog from the server into the local read-through
//! cache so the register can keep selling fully offline. Refreshes are
//! opportunistic: the scheduler runs one after every successful sync, and a
//! failure is logged and forgotten - the cache is never authoritative for
//! stock decisions.

use std::time::Duration;

use tracing::{debug, info};

use vela_core::Product;

use crate::config::RegisterConfig;
use crate::error::{RegisterError, RegisterResult};
use crate::store::SaleStore;

/// Fetches catalog snapshots from the server.
pub struct CatalogClient {
    store: SaleStore,
    http: reqwest::Client,
    catalog_url: String,
    timeout: Duration,
}

impl CatalogClient {
    pub fn new(store: SaleStore, config: &RegisterConfig) -> Self {
        CatalogClient {
            store,
            http: reqwest::Client::new(),
            catalog_url: config.catalog_url(),
            timeout: config.request_timeout(),
        }
    }

    /// Fetches the catalog and upserts it into the cache.
    /// Returns the number of refreshed entries.
    pub async fn refresh(&self) -> RegisterResult<usize> {
        debug!(url = %self.catalog_url, "Refreshing catalog cache");

        let response = self
            .http
            .get(&self.catalog_url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegisterError::ServerStatus {
                status: status.as_u16(),
            });
        }

        let products: Vec<Product> = response.json().await?;
        let count = self.store.upsert_catalog(&products).await?;
        info!(count, "Catalog cache refreshed");
        Ok(count)
    }
}
