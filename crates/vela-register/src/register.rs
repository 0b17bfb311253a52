//! # Register Facade
//!
//! The cashier-facing surface of the runtime: record a sale (always an
//! immediate local success), query a non-blocking sync indicator, and read
//! the cached catalog.
//!
//! ## Recording a Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record_sale(draft)                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate ──► SaleStore::put (durable, ALWAYS - offline or online)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  online?  ──yes──► scheduler.trigger_now()                              │
//! │       │            (same path as scheduled reconciliation)              │
//! │       no                                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  return PendingSale - the cashier never waits for the network,         │
//! │  and a sync failure never un-does a recorded sale.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vela_core::{validation, CachedCatalogEntry, PendingSale, SaleDraft};

use crate::catalog::CatalogClient;
use crate::config::RegisterConfig;
use crate::connectivity::{ConnectivityHandle, ConnectivityMonitor};
use crate::error::RegisterResult;
use crate::reconcile::ReconcileClient;
use crate::scheduler::{SchedulerState, SyncScheduler, SyncSchedulerHandle};
use crate::store::SaleStore;

// =============================================================================
// Status DTO
// =============================================================================

/// Non-blocking sync indicator shown next to the register UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterStatus {
    /// Debounced server reachability.
    pub online: bool,
    /// Sales recorded locally and not yet acknowledged.
    pub pending_count: i64,
    /// Whether a sync is in flight right now.
    pub syncing: bool,
    /// Last successful sync completion (ISO8601).
    pub last_sync_at: Option<String>,
    /// Last sync error, cleared on success.
    pub last_error: Option<String>,
}

// =============================================================================
// Register Service
// =============================================================================

/// The assembled register runtime: durable store, connectivity monitor and
/// sync scheduler, wired together at startup and dependency-injected - no
/// ambient globals.
pub struct RegisterService {
    store: SaleStore,
    connectivity: ConnectivityHandle,
    scheduler: SyncSchedulerHandle,
}

impl RegisterService {
    /// Wires up and starts the full register runtime: spawns the
    /// connectivity monitor and the sync scheduler, and returns the facade.
    pub fn start(store: SaleStore, config: &RegisterConfig) -> RegisterResult<RegisterService> {
        config.validate()?;

        let (monitor, connectivity) = ConnectivityMonitor::new(config.health_url(), &config.probe);
        let reconciler = Arc::new(ReconcileClient::new(store.clone(), config));
        let catalog = Arc::new(CatalogClient::new(store.clone(), config));
        let (scheduler, scheduler_handle) = SyncScheduler::new(
            reconciler,
            Some(catalog),
            connectivity.clone(),
            config.sync.clone(),
        );

        tokio::spawn(monitor.run());
        tokio::spawn(scheduler.run());

        info!(device = %config.device.name, server = %config.server.base_url, "Register runtime started");

        Ok(RegisterService {
            store,
            connectivity,
            scheduler: scheduler_handle,
        })
    }

    /// Assembles a service from pre-built parts (used by tests that drive
    /// the pieces themselves).
    pub fn from_parts(
        store: SaleStore,
        connectivity: ConnectivityHandle,
        scheduler: SyncSchedulerHandle,
    ) -> RegisterService {
        RegisterService {
            store,
            connectivity,
            scheduler,
        }
    }

    /// Records a sale. Always an immediate local success; when the server is
    /// reachable an immediate sync is triggered through the same path used
    /// by scheduled reconciliation.
    pub async fn record_sale(&self, draft: SaleDraft) -> RegisterResult<PendingSale> {
        validation::validate_draft(&draft)?;

        let sale = self.store.put(draft).await?;

        if self.connectivity.is_online() {
            let triggered = self.scheduler.trigger_now();
            debug!(local_id = %sale.local_id, triggered, "Online, immediate sync requested");
        } else {
            debug!(local_id = %sale.local_id, "Offline, sale queued for reconciliation");
        }

        Ok(sale)
    }

    /// Non-blocking pending/failed indicator for the cashier.
    pub async fn status(&self) -> RegisterResult<RegisterStatus> {
        let pending_count = self.store.count_unsynced().await?;
        let scheduler = self.scheduler.status().await;

        Ok(RegisterStatus {
            online: self.connectivity.is_online(),
            pending_count,
            syncing: scheduler.state == SchedulerState::Syncing,
            last_sync_at: scheduler.last_sync_at.map(|t| t.to_rfc3339()),
            last_error: scheduler.last_error,
        })
    }

    /// Injects an OS reachability edge into the connectivity monitor.
    pub async fn report_os_event(&self, up: bool) {
        self.connectivity.report_os_event(up).await;
    }

    /// Requests an immediate reconciliation attempt.
    pub fn sync_now(&self) -> bool {
        self.scheduler.trigger_now()
    }

    /// Cached catalog for offline selling.
    pub async fn catalog(&self) -> RegisterResult<Vec<CachedCatalogEntry>> {
        self.store.catalog().await
    }

    /// Cached catalog lookup by product code.
    pub async fn catalog_lookup(&self, code: &str) -> RegisterResult<Option<CachedCatalogEntry>> {
        self.store.catalog_lookup(code).await
    }

    /// The underlying store (status screens, tests).
    pub fn store(&self) -> &SaleStore {
        &self.store
    }

    /// Stops the background tasks.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.connectivity.shutdown().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
