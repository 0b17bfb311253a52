//! Database layer for the Cloud API.
//!
//! Provides SQLite connectivity, embedded migrations and repository methods.
//! Settlement-internal writes live in `settlement.rs` so they can share one
//! transaction; everything here is either a read path or a standalone write
//! (seeding, approval workflow entry points).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use vela_core::{
    Customer, DebtRecord, DebtStatus, PaymentMethod, Product, Sale, SaleLine, SaleStatus,
};

use crate::error::ApiError;

/// Embedded migrations from the crate's `migrations/` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Database connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database and run migrations.
    pub async fn connect(url: &str) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ApiError::Database(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        info!(url, "Database pool created");

        let db = Database { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// In-memory database for tests. Single connection: an in-memory SQLite
    /// database exists per connection.
    pub async fn in_memory() -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| ApiError::Database(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<(), ApiError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checks if the database is responsive.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // =========================================================================
    // Sale Operations
    // =========================================================================

    /// Looks up the server sale id recorded for a client local id.
    /// This is the idempotency check of the ingestion endpoint.
    pub async fn find_sale_id_by_local_id(
        &self,
        local_id: &str,
    ) -> Result<Option<String>, ApiError> {
        let id = sqlx::query_scalar::<_, String>(
            "SELECT id FROM sales WHERE client_local_id = ?1",
        )
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Loads a settled sale with its items.
    pub async fn get_sale(&self, id: &str) -> Result<Option<Sale>, ApiError> {
        let row = sqlx::query_as::<_, SaleRow>(
            r#"
            SELECT id, total_minor, amount_paid_minor, payment_method,
                   customer_id, is_return, status, client_local_id,
                   synced_at, created_at
            FROM sales
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, SaleItemRow>(
            r#"
            SELECT product_id, code, name, unit_price_minor, quantity
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_sale(items)))
    }

    // =========================================================================
    // Product Operations
    // =========================================================================

    /// Returns the full product catalog (register cache feed).
    pub async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT id, code, name, price_minor, quantity FROM products ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    /// Gets a product by id.
    pub async fn get_product(&self, id: &str) -> Result<Option<Product>, ApiError> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, code, name, price_minor, quantity FROM products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    /// Inserts or replaces a product (catalog management / seeding).
    pub async fn upsert_product(&self, product: &Product) -> Result<(), ApiError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO products (id, code, name, price_minor, quantity, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT (id) DO UPDATE SET
                code = excluded.code,
                name = excluded.name,
                price_minor = excluded.price_minor,
                quantity = excluded.quantity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.id)
        .bind(&product.code)
        .bind(&product.name)
        .bind(product.price_minor)
        .bind(product.quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Customer Ledger Operations
    // =========================================================================

    /// Gets a customer by id.
    pub async fn get_customer(&self, id: &str) -> Result<Option<Customer>, ApiError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, phone, debt_minor, loyalty_points,
                   purchase_total_minor, created_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(customer)
    }

    /// Inserts a customer (seeding / CRUD collaborator entry point).
    pub async fn insert_customer(&self, customer: &Customer) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, phone, debt_minor, loyalty_points,
                purchase_total_minor, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.debt_minor)
        .bind(customer.loyalty_points)
        .bind(customer.purchase_total_minor)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts a debt record (approval workflow entry point / seeding).
    pub async fn insert_debt_record(&self, record: &DebtRecord) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO debt_records (
                id, customer_id, sale_id, amount_minor, paid_amount_minor,
                status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&record.id)
        .bind(&record.customer_id)
        .bind(&record.sale_id)
        .bind(record.amount_minor)
        .bind(record.paid_amount_minor)
        .bind(record.status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Approved, not-fully-paid debt records for a customer, oldest first -
    /// the FIFO allocation order.
    pub async fn outstanding_debts(&self, customer_id: &str) -> Result<Vec<DebtRecord>, ApiError> {
        let records = sqlx::query_as::<_, DebtRecord>(
            r#"
            SELECT id, customer_id, sale_id, amount_minor, paid_amount_minor,
                   status, created_at
            FROM debt_records
            WHERE customer_id = ?1
              AND status = ?2
              AND paid_amount_minor < amount_minor
            ORDER BY created_at ASC
            "#,
        )
        .bind(customer_id)
        .bind(DebtStatus::Approved)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// All debt records for a customer, oldest first.
    pub async fn debt_records(&self, customer_id: &str) -> Result<Vec<DebtRecord>, ApiError> {
        let records = sqlx::query_as::<_, DebtRecord>(
            r#"
            SELECT id, customer_id, sale_id, amount_minor, paid_amount_minor,
                   status, created_at
            FROM debt_records
            WHERE customer_id = ?1
            ORDER BY created_at ASC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Payment entries appended to one debt record, oldest first.
    pub async fn debt_payments(&self, debt_id: &str) -> Result<Vec<DebtPayment>, ApiError> {
        let payments = sqlx::query_as::<_, DebtPayment>(
            r#"
            SELECT id, debt_id, sale_id, amount_minor, paid_at
            FROM debt_payments
            WHERE debt_id = ?1
            ORDER BY paid_at ASC, rowid ASC
            "#,
        )
        .bind(debt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }
}

// =============================================================================
// Record Types
// =============================================================================

/// A payment entry appended while allocating a sale's payment to a debt.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DebtPayment {
    pub id: String,
    pub debt_id: String,
    pub sale_id: Option<String>,
    pub amount_minor: i64,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    total_minor: i64,
    amount_paid_minor: i64,
    payment_method: PaymentMethod,
    customer_id: Option<String>,
    is_return: bool,
    status: SaleStatus,
    client_local_id: Option<String>,
    synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl SaleRow {
    fn into_sale(self, items: Vec<SaleItemRow>) -> Sale {
        Sale {
            id: self.id,
            items: items.into_iter().map(SaleItemRow::into_line).collect(),
            total_minor: self.total_minor,
            amount_paid_minor: self.amount_paid_minor,
            payment_method: self.payment_method,
            customer_id: self.customer_id,
            is_return: self.is_return,
            status: self.status,
            client_local_id: self.client_local_id,
            synced_at: self.synced_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    product_id: String,
    code: String,
    name: String,
    unit_price_minor: i64,
    quantity: i64,
}

impl SaleItemRow {
    fn into_line(self) -> SaleLine {
        SaleLine {
            product_id: self.product_id,
            name: self.name,
            code: self.code,
            unit_price_minor: self.unit_price_minor,
            quantity: self.quantity,
        }
    }
}
