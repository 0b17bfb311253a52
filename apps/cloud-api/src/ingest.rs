//! # Bulk Sale Ingestion
//!
//! Accepts a batch of client-originated sales, deduplicates by client local
//! id, and settles each new sale. At-least-once delivery in, at-most-once
//! effect out.
//!
//! ## Per-Item Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each sale in batch:                                                │
//! │                                                                         │
//! │    Sale with this localId exists? ──yes──► already_synced              │
//! │            │ no                            (no side effects - the same │
//! │            ▼                                batch may be retried after │
//! │    settle on the replay path                a partial network failure) │
//! │            │                                                            │
//! │      ┌─────┴──────────┬──────────────────────┐                          │
//! │      ▼                ▼                      ▼                          │
//! │   synced        unique-index loser      any other failure              │
//! │   (saleId)      → already_synced        → error (this item only;       │
//! │                 (concurrent retry        siblings are unaffected)      │
//! │                  won the race)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The batch itself always succeeds at the transport level; the response is
//! a structured per-item outcome array the client uses to selectively retry.

use tracing::{info, warn};

use vela_core::{SaleEnvelope, SaleSyncResult, SyncSalesRequest, SyncSalesResponse};

use crate::db::Database;
use crate::settlement::{SettlementEngine, SettlementError, SettlementMode};

/// Processes one uploaded batch, producing a per-item outcome array.
pub async fn process_batch(
    engine: &SettlementEngine,
    db: &Database,
    request: SyncSalesRequest,
) -> SyncSalesResponse {
    info!(count = request.sales.len(), "Processing sale sync batch");

    let mut results = Vec::with_capacity(request.sales.len());
    for envelope in &request.sales {
        results.push(process_sale(engine, db, envelope).await);
    }

    let response = SyncSalesResponse::from_results(results);
    info!(
        synced = response.synced,
        failed = response.failed,
        "Sale sync batch complete"
    );
    response
}

/// Ingests a single sale; every failure is contained to this item.
async fn process_sale(
    engine: &SettlementEngine,
    db: &Database,
    envelope: &SaleEnvelope,
) -> SaleSyncResult {
    // Idempotency check: a replayed submission must have no duplicate effect.
    match db.find_sale_id_by_local_id(&envelope.local_id).await {
        Ok(Some(existing)) => {
            return SaleSyncResult::already_synced(&envelope.local_id, Some(existing));
        }
        Ok(None) => {}
        Err(e) => {
            warn!(local_id = %envelope.local_id, error = %e, "Dedupe lookup failed");
            return SaleSyncResult::error(&envelope.local_id, e.to_string());
        }
    }

    match engine.settle(envelope, SettlementMode::Replay).await {
        Ok(sale) => SaleSyncResult::synced(&envelope.local_id, sale.id),

        // A concurrent submission with the same local id won the insert
        // race; our transaction rolled back without effects. Not an error.
        Err(SettlementError::Duplicate(_)) => {
            let existing = db
                .find_sale_id_by_local_id(&envelope.local_id)
                .await
                .ok()
                .flatten();
            SaleSyncResult::already_synced(&envelope.local_id, existing)
        }

        Err(e) => {
            warn!(local_id = %envelope.local_id, error = %e, "Sale failed to settle");
            SaleSyncResult::error(&envelope.local_id, e.to_string())
        }
    }
}
