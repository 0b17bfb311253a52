//! # Reconciliation Client
//!
//! Packages all pending local sales into one bulk request and prunes only
//! the entries the server explicitly confirmed.
//!
//! ## One Sync Attempt
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          sync_once()                                    │
//! │                                                                         │
//! │  1. try_lock in-flight guard ── already held? ──► SyncInProgress (no-op)│
//! │  2. list_unsynced()          ── empty? ─────────► { synced:0, failed:0 }│
//! │  3. mark_syncing(all ids)                                               │
//! │  4. POST /api/sync/sales { sales: [...] }                               │
//! │       │                                                                 │
//! │       ├─ transport error / bad status ──► mark_unsynced(all), Err      │
//! │       │                                   (every sale left untouched)  │
//! │       ▼                                                                 │
//! │  5. per result item:                                                    │
//! │       synced / already_synced ──► mark_synced([id]) then               │
//! │                                   delete_purged([id])                   │
//! │       error                   ──► mark_unsynced([id]) for next attempt │
//! │                                                                         │
//! │  A sale is deleted ONLY after its own mark_synced succeeded.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vela_core::{SaleEnvelope, SyncSalesRequest, SyncSalesResponse};

use crate::config::RegisterConfig;
use crate::error::{RegisterError, RegisterResult};
use crate::store::SaleStore;

// =============================================================================
// Sync Outcome
// =============================================================================

/// Counts reported by one reconciliation attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Sales acknowledged (newly synced or already known) and purged.
    pub synced: usize,
    /// Sales the server reported as per-item errors; left for retry.
    pub failed: usize,
}

// =============================================================================
// Reconcile Client
// =============================================================================

/// Sends pending sales to the ingestion endpoint and applies per-item
/// outcomes to the local store.
pub struct ReconcileClient {
    store: SaleStore,
    http: reqwest::Client,
    sync_url: String,
    timeout: Duration,
    /// Explicit non-reentrancy guard: at most one sync in flight, ever.
    in_flight: Arc<Mutex<()>>,
}

impl ReconcileClient {
    /// Creates a reconciliation client for the configured server.
    pub fn new(store: SaleStore, config: &RegisterConfig) -> Self {
        ReconcileClient {
            store,
            http: reqwest::Client::new(),
            sync_url: config.sync_url(),
            timeout: config.request_timeout(),
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one reconciliation attempt.
    ///
    /// Non-reentrant: a call while another sync is in flight returns
    /// [`RegisterError::SyncInProgress`] without touching anything - the
    /// next natural trigger picks up whatever is still pending.
    pub async fn sync_once(&self) -> RegisterResult<SyncOutcome> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| RegisterError::SyncInProgress)?;

        let pending = self.store.list_unsynced().await?;
        if pending.is_empty() {
            debug!("No pending sales to reconcile");
            return Ok(SyncOutcome::default());
        }

        let ids: Vec<String> = pending.iter().map(|s| s.local_id.clone()).collect();
        info!(count = ids.len(), "Reconciling pending sales");
        self.store.mark_syncing(&ids).await?;

        let request = SyncSalesRequest {
            sales: pending.iter().map(SaleEnvelope::from).collect(),
        };

        let response = match self.send_batch(&request).await {
            Ok(response) => response,
            Err(e) => {
                // Whole-batch transport failure: every sale stays put.
                self.store.mark_unsynced(&ids).await?;
                return Err(e);
            }
        };

        let mut outcome = SyncOutcome::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(response.results.len());

        for result in &response.results {
            seen.insert(result.local_id.clone());
            if result.is_acknowledged() {
                // Mark-then-delete, per sale: a crash in between leaves the
                // row synced-but-present, never deleted-but-unconfirmed.
                self.store.mark_synced(std::slice::from_ref(&result.local_id)).await?;
                self.store
                    .delete_purged(std::slice::from_ref(&result.local_id))
                    .await?;
                outcome.synced += 1;
            } else {
                warn!(
                    local_id = %result.local_id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Sale rejected by server, keeping for retry"
                );
                self.store
                    .mark_unsynced(std::slice::from_ref(&result.local_id))
                    .await?;
                outcome.failed += 1;
            }
        }

        // Ids the server did not report on go back to unsynced as well.
        let missing: Vec<String> = ids.into_iter().filter(|id| !seen.contains(id)).collect();
        if !missing.is_empty() {
            warn!(count = missing.len(), "Server response omitted sales");
            self.store.mark_unsynced(&missing).await?;
            outcome.failed += missing.len();
        }

        info!(
            synced = outcome.synced,
            failed = outcome.failed,
            "Reconciliation attempt finished"
        );
        Ok(outcome)
    }

    async fn send_batch(&self, request: &SyncSalesRequest) -> RegisterResult<SyncSalesResponse> {
        let response = self
            .http
            .post(&self.sync_url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegisterError::ServerStatus {
                status: status.as_u16(),
            });
        }

        Ok(response.json::<SyncSalesResponse>().await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_queue_returns_without_network() {
        let store = SaleStore::in_memory().await.unwrap();
        // Port 1 never listens; an empty queue must short-circuit before
        // any request is attempted.
        let mut config = RegisterConfig::default();
        config.server.base_url = "http://127.0.0.1:1".into();

        let client = ReconcileClient::new(store, &config);
        let outcome = client.sync_once().await.unwrap();
        assert_eq!(outcome, SyncOutcome::default());
    }
}
