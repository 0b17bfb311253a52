//! HTTP surface of the Cloud API.
//!
//! Thin axum handlers over the ingestion and settlement services:
//!
//! - `POST /api/sync/sales` - bulk replay ingestion (always 200, per-item
//!   outcomes)
//! - `POST /api/sales`      - online checkout through the same settlement
//!   engine (insufficient stock → 409)
//! - `GET  /api/catalog`    - product feed for register read-through caches
//! - `GET  /health`         - reachability probe

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tracing::debug;

use vela_core::{
    HealthStatus, Product, Sale, SaleEnvelope, SyncSalesRequest, SyncSalesResponse,
};

use crate::error::ApiError;
use crate::ingest;
use crate::settlement::{SettlementError, SettlementMode};
use crate::AppState;

/// Builds the API router over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sync/sales", post(sync_sales))
        .route("/api/sales", post(checkout))
        .route("/api/catalog", get(catalog))
        .with_state(state)
}

/// Reachability probe. Success/failure plus a timestamp; never business data.
async fn health(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    if !state.db.health_check().await {
        return Err(ApiError::Internal("database unavailable".into()));
    }
    Ok(Json(HealthStatus::ok(Utc::now())))
}

/// Bulk sale ingestion (offline-replay path). Always 200 with a structured
/// per-item outcome array; one bad item never fails the whole batch.
async fn sync_sales(
    State(state): State<AppState>,
    Json(request): Json<SyncSalesRequest>,
) -> Json<SyncSalesResponse> {
    Json(ingest::process_batch(&state.engine, &state.db, request).await)
}

/// Online checkout: same settlement engine, Checkout mode. A double-submitted
/// local id resolves to the already-recorded sale instead of a duplicate.
async fn checkout(
    State(state): State<AppState>,
    Json(envelope): Json<SaleEnvelope>,
) -> Result<Json<Sale>, ApiError> {
    match state.engine.settle(&envelope, SettlementMode::Checkout).await {
        Ok(sale) => Ok(Json(sale)),
        Err(SettlementError::Duplicate(local_id)) => {
            debug!(%local_id, "Checkout replayed an already-recorded sale");
            let existing = state
                .db
                .find_sale_id_by_local_id(&local_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("sale for local id {local_id}")))?;
            let sale = state
                .db
                .get_sale(&existing)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("sale {existing}")))?;
            Ok(Json(sale))
        }
        Err(e) => Err(e.into()),
    }
}

/// Product feed for the register read-through caches.
async fn catalog(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.db.list_products().await?))
}
