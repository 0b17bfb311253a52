//! # vela-core: Pure Business Logic for Vela POS
//!
//! This crate contains the I/O-free heart of the offline-first sale pipeline:
//! domain types, the sync wire protocol, money arithmetic, and the
//! settlement math (loyalty accrual, FIFO debt allocation) that both the
//! register and the cloud API rely on.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vela POS Data Flow                               │
//! │                                                                         │
//! │   vela-register ──────────┐            ┌────────── cloud-api            │
//! │   (local queue,           │            │            (ingestion,         │
//! │    scheduler)             ▼            ▼             settlement)        │
//! │                 ┌─────────────────────────────────┐                     │
//! │                 │       vela-core (THIS CRATE)    │                     │
//! │                 │                                 │                     │
//! │                 │  types       protocol           │                     │
//! │                 │  money       allocation         │                     │
//! │                 │  validation  error              │                     │
//! │                 └─────────────────────────────────┘                     │
//! │                                                                         │
//! │  Both sides of the wire share the same payload shapes and the same     │
//! │  settlement arithmetic, so they cannot drift apart.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Golden Rule
//! No I/O. Everything here is testable without mocks, a database, or a
//! network.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod error;
pub mod money;
pub mod protocol;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use allocation::{
    allocate_payment, loyalty_points_for, DebtApplication, OutstandingDebt, PaymentAllocation,
    LOYALTY_POINT_UNIT_MINOR,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use protocol::{
    HealthStatus, SaleEnvelope, SaleSyncResult, SaleSyncStatus, SyncSalesRequest,
    SyncSalesResponse,
};
pub use types::{
    CachedCatalogEntry, Customer, DebtRecord, DebtStatus, PaymentMethod, PendingSale, Product,
    Sale, SaleDraft, SaleLine, SaleStatus, SyncState,
};
