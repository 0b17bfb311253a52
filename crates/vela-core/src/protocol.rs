//! # Sync Wire Protocol
//!
//! JSON payload shapes for the bulk sync call and the health probe, shared
//! verbatim by the register client and the cloud API so the two sides can
//! never drift apart.
//!
//! ## Bulk Sync Exchange
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Register                                 Cloud API                     │
//! │     │                                         │                         │
//! │     │  POST /api/sync/sales                   │                         │
//! │     │  { sales: [ {localId, items, ...} ] }   │                         │
//! │     │ ───────────────────────────────────────►│                         │
//! │     │                                         │ per item:               │
//! │     │                                         │  dedupe → settle        │
//! │     │  200 { success, synced, failed,         │                         │
//! │     │        results: [ {localId, status} ] } │                         │
//! │     │ ◄───────────────────────────────────────│                         │
//! │     │                                         │                         │
//! │  per result: synced/already_synced → mark + purge; error → keep        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The response is always `200`; failures are expressed per item so one bad
//! sale never poisons its siblings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PaymentMethod, PendingSale, SaleLine};

// =============================================================================
// Sale Envelope
// =============================================================================

/// One client-originated sale as it travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleEnvelope {
    /// Client-generated idempotency key, stable across retries.
    pub local_id: String,
    pub items: Vec<SaleLine>,
    pub total_minor: i64,
    /// Amount actually handed over; absent means fully paid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_paid_minor: Option<i64>,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub is_return: bool,
    pub created_at: DateTime<Utc>,
}

impl SaleEnvelope {
    /// Amount paid in minor units; defaults to the full total.
    #[inline]
    pub fn amount_paid_or_total(&self) -> i64 {
        self.amount_paid_minor.unwrap_or(self.total_minor)
    }
}

impl From<&PendingSale> for SaleEnvelope {
    fn from(sale: &PendingSale) -> Self {
        SaleEnvelope {
            local_id: sale.local_id.clone(),
            items: sale.lines.clone(),
            total_minor: sale.total_minor,
            amount_paid_minor: sale.amount_paid_minor,
            payment_method: sale.payment_method,
            customer_id: sale.customer_id.clone(),
            is_return: sale.is_return,
            created_at: sale.created_at,
        }
    }
}

// =============================================================================
// Bulk Sync Request / Response
// =============================================================================

/// The full batch of pending sales, sent as one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSalesRequest {
    pub sales: Vec<SaleEnvelope>,
}

/// Per-item outcome of a bulk sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleSyncStatus {
    /// Newly settled and recorded by this submission.
    Synced,
    /// A Sale with this `local_id` already existed; no side effects ran.
    AlreadySynced,
    /// This item failed; siblings are unaffected and the client retries it.
    Error,
}

/// Outcome for one sale in the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleSyncResult {
    pub local_id: String,
    pub status: SaleSyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaleSyncResult {
    pub fn synced(local_id: impl Into<String>, sale_id: impl Into<String>) -> Self {
        SaleSyncResult {
            local_id: local_id.into(),
            status: SaleSyncStatus::Synced,
            sale_id: Some(sale_id.into()),
            error: None,
        }
    }

    pub fn already_synced(local_id: impl Into<String>, sale_id: Option<String>) -> Self {
        SaleSyncResult {
            local_id: local_id.into(),
            status: SaleSyncStatus::AlreadySynced,
            sale_id,
            error: None,
        }
    }

    pub fn error(local_id: impl Into<String>, error: impl Into<String>) -> Self {
        SaleSyncResult {
            local_id: local_id.into(),
            status: SaleSyncStatus::Error,
            sale_id: None,
            error: Some(error.into()),
        }
    }

    /// True when the server has durably recorded this sale (either just now
    /// or on an earlier submission) and the client may purge it.
    #[inline]
    pub fn is_acknowledged(&self) -> bool {
        matches!(
            self.status,
            SaleSyncStatus::Synced | SaleSyncStatus::AlreadySynced
        )
    }
}

/// The bulk response: always `200`, with per-item outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSalesResponse {
    pub success: bool,
    pub synced: usize,
    pub failed: usize,
    pub results: Vec<SaleSyncResult>,
}

impl SyncSalesResponse {
    /// Builds the response from per-item results, deriving the counters.
    pub fn from_results(results: Vec<SaleSyncResult>) -> Self {
        let synced = results.iter().filter(|r| r.is_acknowledged()).count();
        let failed = results.len() - synced;
        SyncSalesResponse {
            success: failed == 0,
            synced,
            failed,
            results,
        }
    }
}

// =============================================================================
// Health Probe
// =============================================================================

/// Lightweight reachability payload; used only by the connectivity monitor,
/// never for business data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
    pub fn ok(now: DateTime<Utc>) -> Self {
        HealthStatus {
            status: "ok".into(),
            timestamp: now,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
