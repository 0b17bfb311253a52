//! # vela-register: Register-Side Runtime for Vela POS
//!
//! Keeps a cash register selling when the network is down, and reconciles
//! every locally recorded sale with the server of record exactly once when
//! it comes back.
//!
//! ## Moving Parts
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      vela-register (THIS CRATE)                         │
//! │                                                                         │
//! │  RegisterService (register.rs) - cashier facade                        │
//! │       │ record_sale: validate → durable put → trigger if online        │
//! │       ▼                                                                 │
//! │  ┌─────────────┐   online?   ┌──────────────────┐   sync_once()        │
//! │  │ SaleStore   │◄────────────│ SyncScheduler    │──────────────┐       │
//! │  │ (store.rs)  │             │ (scheduler.rs)   │              ▼       │
//! │  │ SQLite WAL  │             │ reconnect/timer/ │   ┌──────────────┐   │
//! │  │ sale queue +│             │ manual triggers  │   │ReconcileClient│  │
//! │  │ catalog     │             └────────▲─────────┘   │(reconcile.rs)│   │
//! │  │ cache       │                      │             │ bulk POST +  │   │
//! │  └─────────────┘             ┌────────┴─────────┐   │ mark + purge │   │
//! │                              │ Connectivity     │   └──────────────┘   │
//! │                              │ Monitor          │                      │
//! │                              │ (connectivity.rs)│                      │
//! │                              └──────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Correctness rests on two rules: the store's mark-then-delete purge
//! protocol (a sale is never deleted unconfirmed) and the scheduler's
//! single-sync-in-flight guarantee (an explicit lock, not task ordering).

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod reconcile;
pub mod register;
pub mod scheduler;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::CatalogClient;
pub use config::{DeviceConfig, ProbeSettings, RegisterConfig, ServerSettings, SyncSettings};
pub use connectivity::{ConnectivityEvent, ConnectivityHandle, ConnectivityMonitor};
pub use error::{RegisterError, RegisterResult};
pub use reconcile::{ReconcileClient, SyncOutcome};
pub use register::{RegisterService, RegisterStatus};
pub use scheduler::{SchedulerState, SchedulerStatus, SyncScheduler, SyncSchedulerHandle};
pub use store::SaleStore;
