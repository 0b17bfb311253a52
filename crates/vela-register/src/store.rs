//! # Local Sale Store
//!
//! The durable, register-local queue of pending sales plus the cached
//! catalog snapshot. Survives application restarts; a sale written here is
//! safe even if the process dies the moment `put` returns.
//!
//! ## The Mark-Then-Delete Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Pending Sale Lifecycle                              │
//! │                                                                         │
//! │  put()            sync batch sent        server ack        purge       │
//! │  ─────►  unsynced ───────────────► syncing ──────► synced ──────► ∅    │
//! │              ▲                        │                                 │
//! │              └────────────────────────┘                                 │
//! │         transport failure / per-item error / crash mid-sync            │
//! │                                                                         │
//! │  mark_synced and delete_purged are SEPARATE calls: a crash between     │
//! │  the two leaves the sale visibly synced but not yet purged - never     │
//! │  deleted-but-unconfirmed. delete_purged refuses to remove a row that   │
//! │  was not first marked synced.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use vela_core::{
    CachedCatalogEntry, PaymentMethod, PendingSale, Product, SaleDraft, SaleLine, SyncState,
};

use crate::error::{RegisterError, RegisterResult};

/// Embedded migrations from the crate's `migrations/` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct PendingSaleRow {
    local_id: String,
    lines: String,
    total_minor: i64,
    amount_paid_minor: Option<i64>,
    payment_method: PaymentMethod,
    customer_id: Option<String>,
    is_return: bool,
    sync_state: SyncState,
    created_at: DateTime<Utc>,
}

impl PendingSaleRow {
    fn into_pending_sale(self) -> RegisterResult<PendingSale> {
        let lines: Vec<SaleLine> = serde_json::from_str(&self.lines)?;
        Ok(PendingSale {
            local_id: self.local_id,
            lines,
            total_minor: self.total_minor,
            amount_paid_minor: self.amount_paid_minor,
            payment_method: self.payment_method,
            customer_id: self.customer_id,
            is_return: self.is_return,
            sync_state: self.sync_state,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogRow {
    product_id: String,
    code: String,
    name: String,
    price_minor: i64,
    quantity: i64,
    refreshed_at: DateTime<Utc>,
}

impl From<CatalogRow> for CachedCatalogEntry {
    fn from(row: CatalogRow) -> Self {
        CachedCatalogEntry {
            product_id: row.product_id,
            code: row.code,
            name: row.name,
            price_minor: row.price_minor,
            quantity: row.quantity,
            refreshed_at: row.refreshed_at,
        }
    }
}

// =============================================================================
// Sale Store
// =============================================================================

/// Durable local store for pending sales and the catalog cache.
#[derive(Debug, Clone)]
pub struct SaleStore {
    pool: SqlitePool,
}

impl SaleStore {
    /// Opens (or creates) the store at the given path and runs migrations.
    pub async fn open(path: impl AsRef<Path>) -> RegisterResult<Self> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| RegisterError::Database(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            // FULL, not NORMAL: a recorded sale must survive power loss the
            // moment put() returns.
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true)
            .create_if_missing(true);

        info!(path = %path.as_ref().display(), "Opening local sale store");
        Self::connect(options, 4).await
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> RegisterResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| RegisterError::Database(e.to_string()))?;
        // In-memory databases exist per connection; keep exactly one.
        Self::connect(options, 1).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> RegisterResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        Ok(SaleStore { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Pending Sale Queue
    // =========================================================================

    /// Persists a sale draft, assigning a `local_id` when absent.
    ///
    /// The row is durable before this returns; the caller may show the
    /// cashier an immediate local success.
    pub async fn put(&self, draft: SaleDraft) -> RegisterResult<PendingSale> {
        let sale = PendingSale {
            local_id: draft
                .local_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            lines: draft.lines,
            total_minor: draft.total_minor,
            amount_paid_minor: draft.amount_paid_minor,
            payment_method: draft.payment_method,
            customer_id: draft.customer_id,
            is_return: draft.is_return,
            sync_state: SyncState::Unsynced,
            created_at: Utc::now(),
        };

        debug!(local_id = %sale.local_id, total = sale.total_minor, "Recording pending sale");

        let lines = serde_json::to_string(&sale.lines)?;
        sqlx::query(
            r#"
            INSERT INTO pending_sales (
                local_id, lines, total_minor, amount_paid_minor,
                payment_method, customer_id, is_return, sync_state, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&sale.local_id)
        .bind(&lines)
        .bind(sale.total_minor)
        .bind(sale.amount_paid_minor)
        .bind(sale.payment_method)
        .bind(&sale.customer_id)
        .bind(sale.is_return)
        .bind(sale.sync_state)
        .bind(sale.created_at)
        .execute(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets a pending sale by its local id.
    pub async fn get(&self, local_id: &str) -> RegisterResult<Option<PendingSale>> {
        let row = sqlx::query_as::<_, PendingSaleRow>(
            r#"
            SELECT local_id, lines, total_minor, amount_paid_minor,
                   payment_method, customer_id, is_return, sync_state, created_at
            FROM pending_sales
            WHERE local_id = ?1
            "#,
        )
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PendingSaleRow::into_pending_sale).transpose()
    }

    /// Returns every sale not yet acknowledged by the server, oldest first.
    ///
    /// Rows stuck in `syncing` (a crash mid-batch) are included, so resuming
    /// after a restart retries them automatically.
    pub async fn list_unsynced(&self) -> RegisterResult<Vec<PendingSale>> {
        let rows = sqlx::query_as::<_, PendingSaleRow>(
            r#"
            SELECT local_id, lines, total_minor, amount_paid_minor,
                   payment_method, customer_id, is_return, sync_state, created_at
            FROM pending_sales
            WHERE sync_state <> ?1
            ORDER BY created_at ASC
            "#,
        )
        .bind(SyncState::Synced)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(PendingSaleRow::into_pending_sale)
            .collect()
    }

    /// Marks the given sales as part of an in-flight batch.
    pub async fn mark_syncing(&self, local_ids: &[String]) -> RegisterResult<()> {
        self.set_state(local_ids, SyncState::Syncing, None).await
    }

    /// Resets in-flight sales back to `unsynced` after a failed attempt.
    /// Rows already acknowledged keep their `synced` state.
    pub async fn mark_unsynced(&self, local_ids: &[String]) -> RegisterResult<()> {
        self.set_state(local_ids, SyncState::Unsynced, Some(SyncState::Syncing))
            .await
    }

    /// Marks the given sales as acknowledged by the server.
    pub async fn mark_synced(&self, local_ids: &[String]) -> RegisterResult<()> {
        self.set_state(local_ids, SyncState::Synced, None).await
    }

    async fn set_state(
        &self,
        local_ids: &[String],
        state: SyncState,
        only_from: Option<SyncState>,
    ) -> RegisterResult<()> {
        if local_ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for local_id in local_ids {
            match only_from {
                Some(from) => {
                    sqlx::query(
                        "UPDATE pending_sales SET sync_state = ?1 \
                         WHERE local_id = ?2 AND sync_state = ?3",
                    )
                    .bind(state)
                    .bind(local_id)
                    .bind(from)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("UPDATE pending_sales SET sync_state = ?1 WHERE local_id = ?2")
                        .bind(state)
                        .bind(local_id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes sales that were previously marked `synced`.
    ///
    /// A row that was never confirmed is left alone - this is the second
    /// half of the mark-then-delete protocol, and the reason a crash can
    /// never lose an unconfirmed sale.
    pub async fn delete_purged(&self, local_ids: &[String]) -> RegisterResult<u64> {
        if local_ids.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        let mut tx = self.pool.begin().await?;
        for local_id in local_ids {
            let result =
                sqlx::query("DELETE FROM pending_sales WHERE local_id = ?1 AND sync_state = ?2")
                    .bind(local_id)
                    .bind(SyncState::Synced)
                    .execute(&mut *tx)
                    .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;

        debug!(requested = local_ids.len(), deleted, "Purged synced sales");
        Ok(deleted)
    }

    /// Counts sales not yet acknowledged by the server.
    pub async fn count_unsynced(&self) -> RegisterResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_sales WHERE sync_state <> ?1")
                .bind(SyncState::Synced)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // =========================================================================
    // Catalog Cache
    // =========================================================================

    /// Upserts a catalog snapshot fetched from the server.
    pub async fn upsert_catalog(&self, products: &[Product]) -> RegisterResult<usize> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for product in products {
            sqlx::query(
                r#"
                INSERT INTO catalog_cache (
                    product_id, code, name, price_minor, quantity, refreshed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (product_id) DO UPDATE SET
                    code = excluded.code,
                    name = excluded.name,
                    price_minor = excluded.price_minor,
                    quantity = excluded.quantity,
                    refreshed_at = excluded.refreshed_at
                "#,
            )
            .bind(&product.id)
            .bind(&product.code)
            .bind(&product.name)
            .bind(product.price_minor)
            .bind(product.quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(products.len())
    }

    /// Returns the full cached catalog.
    pub async fn catalog(&self) -> RegisterResult<Vec<CachedCatalogEntry>> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            "SELECT product_id, code, name, price_minor, quantity, refreshed_at \
             FROM catalog_cache ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CachedCatalogEntry::from).collect())
    }

    /// Looks up a cached product by its code (barcode scan path).
    pub async fn catalog_lookup(&self, code: &str) -> RegisterResult<Option<CachedCatalogEntry>> {
        let row = sqlx::query_as::<_, CatalogRow>(
            "SELECT product_id, code, name, price_minor, quantity, refreshed_at \
             FROM catalog_cache WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CachedCatalogEntry::from))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::PaymentMethod;

    fn draft(total: i64) -> SaleDraft {
        SaleDraft {
            local_id: None,
            lines: vec![SaleLine {
                product_id: "p-1".into(),
                name: "Robusta beans 1kg".into(),
                code: "RB-1KG".into(),
                unit_price_minor: total,
                quantity: 1,
            }],
            total_minor: total,
            amount_paid_minor: None,
            payment_method: PaymentMethod::Cash,
            customer_id: None,
            is_return: false,
        }
    }

    #[tokio::test]
    async fn test_put_assigns_local_id_and_persists() {
        let store = SaleStore::in_memory().await.unwrap();
        let sale = store.put(draft(50_000)).await.unwrap();

        assert!(!sale.local_id.is_empty());
        assert_eq!(sale.sync_state, SyncState::Unsynced);

        let loaded = store.get(&sale.local_id).await.unwrap().unwrap();
        assert_eq!(loaded.total_minor, 50_000);
        assert_eq!(loaded.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_put_keeps_provided_local_id() {
        let store = SaleStore::in_memory().await.unwrap();
        let mut d = draft(10_000);
        d.local_id = Some("fixed-id".into());
        let sale = store.put(d).await.unwrap();
        assert_eq!(sale.local_id, "fixed-id");
    }

    #[tokio::test]
    async fn test_list_unsynced_includes_stale_syncing_rows() {
        let store = SaleStore::in_memory().await.unwrap();
        let a = store.put(draft(10_000)).await.unwrap();
        let b = store.put(draft(20_000)).await.unwrap();

        // Simulate a crash mid-batch: one row stuck in syncing.
        store.mark_syncing(&[a.local_id.clone()]).await.unwrap();

        let unsynced = store.list_unsynced().await.unwrap();
        let ids: Vec<_> = unsynced.iter().map(|s| s.local_id.as_str()).collect();
        assert!(ids.contains(&a.local_id.as_str()));
        assert!(ids.contains(&b.local_id.as_str()));
    }

    #[tokio::test]
    async fn test_delete_requires_prior_mark_synced() {
        let store = SaleStore::in_memory().await.unwrap();
        let sale = store.put(draft(10_000)).await.unwrap();
        let ids = vec![sale.local_id.clone()];

        // Deleting an unconfirmed sale is a no-op.
        assert_eq!(store.delete_purged(&ids).await.unwrap(), 0);
        assert!(store.get(&sale.local_id).await.unwrap().is_some());

        // Mark-then-delete removes it.
        store.mark_synced(&ids).await.unwrap();
        assert_eq!(store.delete_purged(&ids).await.unwrap(), 1);
        assert!(store.get(&sale.local_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_unsynced_does_not_downgrade_synced_rows() {
        let store = SaleStore::in_memory().await.unwrap();
        let sale = store.put(draft(10_000)).await.unwrap();
        let ids = vec![sale.local_id.clone()];

        store.mark_synced(&ids).await.unwrap();
        store.mark_unsynced(&ids).await.unwrap();

        let loaded = store.get(&sale.local_id).await.unwrap().unwrap();
        assert_eq!(loaded.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_count_unsynced() {
        let store = SaleStore::in_memory().await.unwrap();
        assert_eq!(store.count_unsynced().await.unwrap(), 0);

        let a = store.put(draft(10_000)).await.unwrap();
        store.put(draft(20_000)).await.unwrap();
        assert_eq!(store.count_unsynced().await.unwrap(), 2);

        store.mark_synced(&[a.local_id]).await.unwrap();
        assert_eq!(store.count_unsynced().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_catalog_upsert_and_lookup() {
        let store = SaleStore::in_memory().await.unwrap();
        let products = vec![Product {
            id: "p-1".into(),
            code: "RB-1KG".into(),
            name: "Robusta beans 1kg".into(),
            price_minor: 75_000,
            quantity: 12,
        }];

        store.upsert_catalog(&products).await.unwrap();
        let entry = store.catalog_lookup("RB-1KG").await.unwrap().unwrap();
        assert_eq!(entry.price_minor, 75_000);

        // A refresh overwrites the snapshot.
        let updated = vec![Product {
            price_minor: 80_000,
            quantity: 9,
            ..products[0].clone()
        }];
        store.upsert_catalog(&updated).await.unwrap();
        let entry = store.catalog_lookup("RB-1KG").await.unwrap().unwrap();
        assert_eq!(entry.price_minor, 80_000);
        assert_eq!(store.catalog().await.unwrap().len(), 1);
    }
}
