//! # Settlement Engine
//!
//! The transactional core: applies a completed sale's effects to the server
//! of record as one atomic unit. Shared by the online checkout path and the
//! offline-replay path.
//!
//! ## One Settlement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    settle(envelope, mode)                               │
//! │                                                                         │
//! │  ┌──────────────────── SINGLE TRANSACTION ──────────────────────────┐  │
//! │  │                                                                  │  │
//! │  │  0. INSERT sale row - the UNIQUE(client_local_id) index          │  │
//! │  │     arbitrates concurrent duplicates; the loser rolls back       │  │
//! │  │                                                                  │  │
//! │  │  1. Stock: quantity -qty (sale) / +qty (return) per line.        │  │
//! │  │     Checkout mode first rejects the whole sale if any line       │  │
//! │  │     exceeds available stock. Replay mode skips the check: a      │  │
//! │  │     sale already rung up offline cannot be rejected              │  │
//! │  │     retroactively, and stock may go negative. Accepted policy    │  │
//! │  │     (pending product-owner confirmation), surfaced to inventory  │  │
//! │  │     reporting, never a sync blocker.                             │  │
//! │  │                                                                  │  │
//! │  │  2. Loyalty: purchase_total += total,                            │  │
//! │  │              points += total / 1,000,000 (floor)                 │  │
//! │  │                                                                  │  │
//! │  │  3. Debt FIFO: payment = min(amount_paid, customer.debt);        │  │
//! │  │     walk approved records oldest-first, append payment entries,  │  │
//! │  │     mark records paid when covered, debt -= applied              │  │
//! │  │                                                                  │  │
//! │  │  4. Remainder: amount_paid < total → remainder recorded as an    │  │
//! │  │     already-approved debt record, debt += remainder              │  │
//! │  │                                                                  │  │
//! │  │  5. INSERT sale items                                            │  │
//! │  └──────────────────────────── COMMIT ──────────────────────────────┘  │
//! │                                                                         │
//! │  6. notify receipt_ready - OUTSIDE the unit, fire-and-forget           │  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite's single-writer model serializes settlement transactions, which is
//! what keeps two concurrent sales from double-spending the same customer's
//! debt balance.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use vela_core::{
    allocate_payment, loyalty_points_for, validation, CoreError, DebtStatus, Money,
    OutstandingDebt, PaymentAllocation, Sale, SaleEnvelope, SaleStatus,
};

use crate::db::Database;
use crate::notify::ReceiptNotifier;

// =============================================================================
// Settlement Mode
// =============================================================================

/// Which path invoked the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementMode {
    /// Synchronous online checkout: availability is checked and the whole
    /// sale is rejected before commit when stock is insufficient.
    Checkout,
    /// Offline replay via bulk sync: the availability check is skipped.
    Replay,
}

// =============================================================================
// Settlement Error
// =============================================================================

/// Errors raised while settling one sale. Each maps to a per-item `error`
/// result on the replay path or an HTTP rejection on the checkout path.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// A sale with this client local id already exists (unique index).
    #[error("Sale already recorded for local id {0}")]
    Duplicate(String),

    /// Business rule violation (stock, unknown product/customer, validation).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failure; the transaction rolled back.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for SettlementError {
    fn from(err: sqlx::Error) -> Self {
        SettlementError::Database(err.to_string())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// =============================================================================
// Settlement Engine
// =============================================================================

/// Applies a sale's effects (stock, loyalty, debt, record) atomically.
pub struct SettlementEngine {
    db: Database,
    notifier: Arc<dyn ReceiptNotifier>,
}

impl SettlementEngine {
    pub fn new(db: Database, notifier: Arc<dyn ReceiptNotifier>) -> Self {
        SettlementEngine { db, notifier }
    }

    /// Settles one sale as a single logical unit. On any error the
    /// transaction rolls back and the server of record is untouched.
    pub async fn settle(
        &self,
        envelope: &SaleEnvelope,
        mode: SettlementMode,
    ) -> Result<Sale, SettlementError> {
        validation::validate_envelope(envelope).map_err(CoreError::from)?;

        let now = Utc::now();
        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            items: envelope.items.clone(),
            total_minor: envelope.total_minor,
            amount_paid_minor: envelope.amount_paid_or_total(),
            payment_method: envelope.payment_method,
            customer_id: envelope.customer_id.clone(),
            is_return: envelope.is_return,
            status: SaleStatus::Completed,
            client_local_id: Some(envelope.local_id.clone()),
            synced_at: Some(now),
            created_at: envelope.created_at,
        };

        debug!(
            local_id = %envelope.local_id,
            total = sale.total_minor,
            ?mode,
            "Settling sale"
        );

        let mut tx = self.db.pool().begin().await?;

        // Sale row first: the unique index on client_local_id makes this the
        // arbitration point for concurrent duplicate submissions.
        insert_sale_row(&mut tx, &sale).await.map_err(|e| {
            if is_unique_violation(&e) {
                SettlementError::Duplicate(envelope.local_id.clone())
            } else {
                e.into()
            }
        })?;

        adjust_stock(&mut tx, &sale, mode).await?;

        if let Some(customer_id) = sale.customer_id.as_deref() {
            apply_customer_effects(&mut tx, &sale, customer_id).await?;
        }

        insert_sale_items(&mut tx, &sale).await?;

        tx.commit().await?;

        // Outside the transactional unit: best-effort, never rolls back 1-4.
        self.notifier.receipt_ready(&sale);

        info!(sale_id = %sale.id, local_id = %envelope.local_id, "Sale settled");
        Ok(sale)
    }
}

// =============================================================================
// Transaction Steps
// =============================================================================

async fn insert_sale_row(tx: &mut SqliteConnection, sale: &Sale) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sales (
            id, total_minor, amount_paid_minor, payment_method, customer_id,
            is_return, status, client_local_id, synced_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&sale.id)
    .bind(sale.total_minor)
    .bind(sale.amount_paid_minor)
    .bind(sale.payment_method)
    .bind(&sale.customer_id)
    .bind(sale.is_return)
    .bind(sale.status)
    .bind(&sale.client_local_id)
    .bind(sale.synced_at)
    .bind(sale.created_at)
    .execute(tx)
    .await?;
    Ok(())
}

async fn insert_sale_items(tx: &mut SqliteConnection, sale: &Sale) -> Result<(), sqlx::Error> {
    for line in &sale.items {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, code, name, unit_price_minor, quantity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&sale.id)
        .bind(&line.product_id)
        .bind(&line.code)
        .bind(&line.name)
        .bind(line.unit_price_minor)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;
    }
    Ok(())
}

/// Step 1: per-line stock adjustment; `-quantity` for a sale, `+quantity`
/// for a return. Checkout mode rejects before any write when a line exceeds
/// available stock.
async fn adjust_stock(
    tx: &mut SqliteConnection,
    sale: &Sale,
    mode: SettlementMode,
) -> Result<(), SettlementError> {
    let now = Utc::now();

    for line in &sale.items {
        let available: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
                .bind(&line.product_id)
                .fetch_optional(&mut *tx)
                .await?;

        let available = available
            .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;

        if mode == SettlementMode::Checkout && !sale.is_return && available < line.quantity {
            return Err(CoreError::InsufficientStock {
                code: line.code.clone(),
                available,
                requested: line.quantity,
            }
            .into());
        }

        let delta = if sale.is_return {
            line.quantity
        } else {
            -line.quantity
        };

        sqlx::query("UPDATE products SET quantity = quantity + ?1, updated_at = ?2 WHERE id = ?3")
            .bind(delta)
            .bind(now)
            .bind(&line.product_id)
            .execute(&mut *tx)
            .await?;
    }

    Ok(())
}

/// Steps 2-4: loyalty accrual, FIFO debt allocation, remainder-as-new-debt.
async fn apply_customer_effects(
    tx: &mut SqliteConnection,
    sale: &Sale,
    customer_id: &str,
) -> Result<(), SettlementError> {
    let debt_minor: Option<i64> =
        sqlx::query_scalar("SELECT debt_minor FROM customers WHERE id = ?1")
            .bind(customer_id)
            .fetch_optional(&mut *tx)
            .await?;

    let debt_minor =
        debt_minor.ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()))?;

    // Step 2: loyalty accrual.
    let total = Money::from_minor(sale.total_minor);
    let points = loyalty_points_for(total);
    sqlx::query(
        "UPDATE customers SET purchase_total_minor = purchase_total_minor + ?1, \
         loyalty_points = loyalty_points + ?2 WHERE id = ?3",
    )
    .bind(sale.total_minor)
    .bind(points)
    .bind(customer_id)
    .execute(&mut *tx)
    .await?;

    // Step 3: FIFO allocation of the paid amount against outstanding debt.
    let amount_paid = Money::from_minor(sale.amount_paid_minor);
    if debt_minor > 0 && amount_paid.is_positive() {
        let payment = amount_paid.min(Money::from_minor(debt_minor));
        let plan = fetch_and_allocate(tx, customer_id, payment).await?;
        apply_allocation(tx, sale, customer_id, &plan).await?;
    }

    // Step 4: unpaid remainder becomes new outstanding balance. Created
    // directly in approved status - the sale already happened, there is
    // nothing left to approve - which keeps the aggregate equal to the sum
    // over non-paid records.
    let remainder = total - amount_paid;
    if remainder.is_positive() {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO debt_records (
                id, customer_id, sale_id, amount_minor, paid_amount_minor,
                status, created_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(customer_id)
        .bind(&sale.id)
        .bind(remainder.minor())
        .bind(DebtStatus::Approved)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE customers SET debt_minor = debt_minor + ?1 WHERE id = ?2")
            .bind(remainder.minor())
            .bind(customer_id)
            .execute(&mut *tx)
            .await?;

        debug!(customer_id, remainder = remainder.minor(), "Recorded unpaid remainder as debt");
    }

    Ok(())
}

/// Reads the customer's approved, not-fully-paid records oldest-first and
/// computes the allocation plan.
async fn fetch_and_allocate(
    tx: &mut SqliteConnection,
    customer_id: &str,
    payment: Money,
) -> Result<PaymentAllocation, SettlementError> {
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT id, amount_minor, paid_amount_minor
        FROM debt_records
        WHERE customer_id = ?1
          AND status = ?2
          AND paid_amount_minor < amount_minor
        ORDER BY created_at ASC
        "#,
    )
    .bind(customer_id)
    .bind(DebtStatus::Approved)
    .fetch_all(&mut *tx)
    .await?;

    let outstanding: Vec<OutstandingDebt> = rows
        .into_iter()
        .map(|(debt_id, amount_minor, paid_minor)| OutstandingDebt {
            debt_id,
            amount_minor,
            paid_minor,
        })
        .collect();

    Ok(allocate_payment(&outstanding, payment))
}

/// Writes an allocation plan: bumps `paid_amount`, appends payment entries,
/// marks covered records paid, and decrements the aggregate debt.
async fn apply_allocation(
    tx: &mut SqliteConnection,
    sale: &Sale,
    customer_id: &str,
    plan: &PaymentAllocation,
) -> Result<(), SettlementError> {
    if plan.applied_minor == 0 {
        return Ok(());
    }

    let now = Utc::now();

    for application in &plan.applications {
        if application.settled {
            sqlx::query(
                "UPDATE debt_records SET paid_amount_minor = paid_amount_minor + ?1, \
                 status = ?2 WHERE id = ?3",
            )
            .bind(application.amount_minor)
            .bind(DebtStatus::Paid)
            .bind(&application.debt_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "UPDATE debt_records SET paid_amount_minor = paid_amount_minor + ?1 WHERE id = ?2",
            )
            .bind(application.amount_minor)
            .bind(&application.debt_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO debt_payments (id, debt_id, sale_id, amount_minor, paid_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&application.debt_id)
        .bind(&sale.id)
        .bind(application.amount_minor)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE customers SET debt_minor = debt_minor - ?1 WHERE id = ?2")
        .bind(plan.applied_minor)
        .bind(customer_id)
        .execute(&mut *tx)
        .await?;

    debug!(
        customer_id,
        applied = plan.applied_minor,
        records = plan.applications.len(),
        "Allocated payment across outstanding debts"
    );

    Ok(())
}
