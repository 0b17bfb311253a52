//! # Vela Cloud API
//!
//! The server of record for Vela POS: ingests client-originated sale batches
//! exactly once and settles each sale atomically.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cloud API Server                                 │
//! │                                                                         │
//! │  Register ───► HTTP (axum) ───► ingest (dedupe by localId)             │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │                              SettlementEngine ───► SQLite (WAL)        │
//! │                                     │              sales, products,    │
//! │                                     │              customers, debts    │
//! │                                     ▼                                   │
//! │                              ReceiptNotifier (fire-and-forget)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod settlement;

use std::sync::Arc;

use crate::db::Database;
use crate::notify::ReceiptNotifier;
use crate::settlement::SettlementEngine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<SettlementEngine>,
}

impl AppState {
    /// Wires the state over a connected database.
    pub fn new(db: Database, notifier: Arc<dyn ReceiptNotifier>) -> Self {
        let engine = Arc::new(SettlementEngine::new(db.clone(), notifier));
        AppState { db, engine }
    }
}
