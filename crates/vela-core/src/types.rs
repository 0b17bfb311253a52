//! # Domain Types
//!
//! Core domain types used throughout Vela POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  REGISTER (local)            SERVER OF RECORD                          │
//! │  ┌─────────────────┐         ┌─────────────────┐  ┌─────────────────┐  │
//! │  │  PendingSale    │  sync   │      Sale       │  │    Customer     │  │
//! │  │  ─────────────  │ ──────► │  ─────────────  │  │  ─────────────  │  │
//! │  │  local_id       │         │  id (UUID)      │  │  debt_minor     │  │
//! │  │  lines[]        │         │  client_local_id│  │  loyalty_points │  │
//! │  │  sync_state     │         │  status         │  │                 │  │
//! │  └─────────────────┘         └─────────────────┘  └────────┬────────┘  │
//! │  ┌─────────────────┐         ┌─────────────────┐           │           │
//! │  │CachedCatalog-   │ ◄────── │    Product      │  ┌────────┴────────┐  │
//! │  │Entry (snapshot) │ catalog │  quantity       │  │   DebtRecord    │  │
//! │  └─────────────────┘         └─────────────────┘  │  amount / paid  │  │
//! │                                                   └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! A sale has two identities:
//! - `local_id`: generated at the register, stable across retries - the
//!   idempotency key for synchronization
//! - server `id`: UUID v4 assigned once by the settlement engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// Bank transfer.
    Transfer,
}

// =============================================================================
// Sync State
// =============================================================================

/// Lifecycle of a locally recorded sale.
///
/// ```text
/// unsynced ──► syncing ──► synced ──► (row deleted)
///     ▲           │
///     └───────────┘  transport failure / per-item error / crash
/// ```
///
/// A row is deleted only after the server acknowledged it while in the
/// `synced` state; a crash between mark and delete leaves a synced-but-
/// present row, never a deleted-but-unconfirmed one.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Recorded locally, not yet acknowledged by the server.
    Unsynced,
    /// Part of an in-flight batch.
    Syncing,
    /// Acknowledged by the server; eligible for purge.
    Synced,
}

// =============================================================================
// Sale Status (server)
// =============================================================================

/// The status of a settled sale on the server of record.
///
/// The settlement engine always records `Completed`; the `Pending`,
/// `Approved` and `Rejected` transitions belong to an external approval
/// workflow that never touches this subsystem.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    Completed,
    Approved,
    Rejected,
}

// =============================================================================
// Debt Status
// =============================================================================

/// The status of a single customer debt record.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    /// Recorded but not yet approved; excluded from FIFO allocation.
    PendingApproval,
    /// Approved and outstanding; eligible for FIFO allocation.
    Approved,
    /// Fully covered by payments.
    Paid,
    /// Rejected by the approval workflow.
    Rejected,
}

// =============================================================================
// Sale Line
// =============================================================================

/// A line item in a sale.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    /// Product reference (server-side product id).
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name: String,
    /// Product code at time of sale (frozen).
    pub code: String,
    /// Unit price in minor units at time of sale (frozen).
    pub unit_price_minor: i64,
    /// Quantity sold (always positive; returns flip the stock sign, not this).
    pub quantity: i64,
}

impl SaleLine {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_minor(self.unit_price_minor)
    }

    /// Line total (unit price × quantity), `None` on overflow.
    #[inline]
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price().checked_mul(self.quantity)
    }
}

// =============================================================================
// Sale Draft (register input)
// =============================================================================

/// What the cashier rings up. The local store turns a draft into a
/// [`PendingSale`] by assigning a `local_id` (when absent) and a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDraft {
    /// Client-generated idempotency key; assigned on `put` when absent.
    #[serde(default)]
    pub local_id: Option<String>,
    pub lines: Vec<SaleLine>,
    pub total_minor: i64,
    /// Amount actually handed over; `None` means the sale is fully paid.
    #[serde(default)]
    pub amount_paid_minor: Option<i64>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub is_return: bool,
}

// =============================================================================
// Pending Sale (register, durable queue entry)
// =============================================================================

/// A locally recorded sale awaiting reconciliation with the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSale {
    /// Client-generated, globally unique, stable across retries.
    pub local_id: String,
    pub lines: Vec<SaleLine>,
    pub total_minor: i64,
    pub amount_paid_minor: Option<i64>,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<String>,
    pub is_return: bool,
    pub sync_state: SyncState,
    pub created_at: DateTime<Utc>,
}

impl PendingSale {
    /// Sale total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_minor(self.total_minor)
    }

    /// Amount paid; defaults to the full total when not recorded separately.
    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_minor(self.amount_paid_minor.unwrap_or(self.total_minor))
    }
}

// =============================================================================
// Sale (server, durable record of truth)
// =============================================================================

/// A settled sale on the server of record. Created exactly once by the
/// settlement engine and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    /// Server-assigned UUID.
    pub id: String,
    pub items: Vec<SaleLine>,
    pub total_minor: i64,
    pub amount_paid_minor: i64,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<String>,
    pub is_return: bool,
    pub status: SaleStatus,
    /// Originating register `local_id`; at most one Sale exists per value.
    pub client_local_id: Option<String>,
    /// When the originating client submission was accepted.
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Product & Catalog Cache
// =============================================================================

/// A product on the server of record. `quantity` is mutated only by the
/// settlement engine, never by UI code.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub code: String,
    pub name: String,
    pub price_minor: i64,
    /// May legitimately go negative via offline replay; see the settlement
    /// engine docs.
    pub quantity: i64,
}

/// Register-local snapshot of a product, letting the register sell fully
/// offline. Read-through: refreshed opportunistically whenever the server is
/// reachable, never authoritative for stock decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedCatalogEntry {
    pub product_id: String,
    pub code: String,
    pub name: String,
    pub price_minor: i64,
    pub quantity: i64,
    pub refreshed_at: DateTime<Utc>,
}

// =============================================================================
// Customer Ledger
// =============================================================================

/// A customer with an aggregate outstanding balance and loyalty account.
///
/// Invariant: `debt_minor == Σ(amount - paid_amount)` over non-paid
/// [`DebtRecord`]s of this customer.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    /// Aggregate outstanding amount across non-paid debt records.
    pub debt_minor: i64,
    pub loyalty_points: i64,
    pub purchase_total_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    #[inline]
    pub fn debt(&self) -> Money {
        Money::from_minor(self.debt_minor)
    }
}

/// A single outstanding obligation. Invariant: `paid_amount ≤ amount` at all
/// times; transitions to `Paid` exactly when fully covered.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtRecord {
    pub id: String,
    pub customer_id: String,
    /// The sale that created this obligation, when known.
    pub sale_id: Option<String>,
    pub amount_minor: i64,
    pub paid_amount_minor: i64,
    pub status: DebtStatus,
    pub created_at: DateTime<Utc>,
}

impl DebtRecord {
    /// Remaining unpaid amount on this record.
    #[inline]
    pub fn outstanding(&self) -> Money {
        Money::from_minor(self.amount_minor - self.paid_amount_minor)
    }

    /// True once the record is fully covered.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.paid_amount_minor >= self.amount_minor
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total() {
        let line = SaleLine {
            product_id: "p-1".into(),
            name: "Robusta beans 1kg".into(),
            code: "RB-1KG".into(),
            unit_price_minor: 75_000,
            quantity: 2,
        };
        assert_eq!(line.line_total(), Some(Money::from_minor(150_000)));
    }

    #[test]
    fn test_amount_paid_defaults_to_total() {
        let sale = PendingSale {
            local_id: "l-1".into(),
            lines: vec![],
            total_minor: 150_000,
            amount_paid_minor: None,
            payment_method: PaymentMethod::Cash,
            customer_id: None,
            is_return: false,
            sync_state: SyncState::Unsynced,
            created_at: Utc::now(),
        };
        assert_eq!(sale.amount_paid(), Money::from_minor(150_000));
    }

    #[test]
    fn test_debt_record_outstanding() {
        let record = DebtRecord {
            id: "d-1".into(),
            customer_id: "c-1".into(),
            sale_id: None,
            amount_minor: 50_000,
            paid_amount_minor: 20_000,
            status: DebtStatus::Approved,
            created_at: Utc::now(),
        };
        assert_eq!(record.outstanding(), Money::from_minor(30_000));
        assert!(!record.is_settled());
    }

    #[test]
    fn test_enum_wire_casing() {
        let json = serde_json::to_string(&DebtStatus::PendingApproval).unwrap();
        assert_eq!(json, "\"pending_approval\"");
        let json = serde_json::to_string(&SyncState::Unsynced).unwrap();
        assert_eq!(json, "\"unsynced\"");
    }
}
