//! Ingestion endpoint contract over real HTTP: idempotent batches, per-item
//! error isolation, checkout rejections.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;

use vela_cloud_api::db::Database;
use vela_cloud_api::notify::NoOpNotifier;
use vela_cloud_api::{api, AppState};
use vela_core::{
    PaymentMethod, Product, SaleEnvelope, SaleLine, SaleSyncStatus, SyncSalesRequest,
    SyncSalesResponse,
};

// =============================================================================
// Fixtures
// =============================================================================

async fn spawn_server() -> (Database, SocketAddr) {
    let db = Database::in_memory().await.unwrap();
    let state = AppState::new(db.clone(), Arc::new(NoOpNotifier));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::router(state)).await.unwrap();
    });

    (db, addr)
}

async fn seed_product(db: &Database, id: &str, quantity: i64) {
    db.upsert_product(&Product {
        id: id.into(),
        code: format!("C-{id}"),
        name: format!("Product {id}"),
        price_minor: 50_000,
        quantity,
    })
    .await
    .unwrap();
}

fn envelope(local_id: &str, product_id: &str, quantity: i64) -> SaleEnvelope {
    SaleEnvelope {
        local_id: local_id.into(),
        items: vec![SaleLine {
            product_id: product_id.into(),
            name: format!("Product {product_id}"),
            code: format!("C-{product_id}"),
            unit_price_minor: 50_000,
            quantity,
        }],
        total_minor: 50_000 * quantity,
        amount_paid_minor: None,
        payment_method: PaymentMethod::Cash,
        customer_id: None,
        is_return: false,
        created_at: Utc::now(),
    }
}

async fn post_batch(addr: SocketAddr, sales: Vec<SaleEnvelope>) -> SyncSalesResponse {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/sync/sales"))
        .json(&SyncSalesRequest { sales })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn health_answers_with_timestamp() {
    let (_db, addr) = spawn_server().await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn resubmitting_a_batch_has_no_duplicate_effect() {
    let (db, addr) = spawn_server().await;
    seed_product(&db, "p1", 10).await;

    let batch = vec![envelope("l-1", "p1", 2), envelope("l-2", "p1", 1)];

    let first = post_batch(addr, batch.clone()).await;
    assert!(first.success);
    assert_eq!(first.synced, 2);
    assert!(first
        .results
        .iter()
        .all(|r| r.status == SaleSyncStatus::Synced));

    // Same batch again, e.g. retried after a lost response: every result is
    // already_synced and nothing changed.
    let second = post_batch(addr, batch).await;
    assert!(second.success);
    assert!(second
        .results
        .iter()
        .all(|r| r.status == SaleSyncStatus::AlreadySynced));

    assert_eq!(db.get_product("p1").await.unwrap().unwrap().quantity, 7);

    // Exactly one Sale per local id, and the replay reported its id.
    let original = db.find_sale_id_by_local_id("l-1").await.unwrap().unwrap();
    let replayed = second
        .results
        .iter()
        .find(|r| r.local_id == "l-1")
        .unwrap();
    assert_eq!(replayed.sale_id.as_deref(), Some(original.as_str()));
}

#[tokio::test]
async fn one_bad_item_does_not_fail_the_batch() {
    let (db, addr) = spawn_server().await;
    seed_product(&db, "p1", 10).await;

    let batch = vec![
        envelope("l-1", "p1", 1),
        envelope("l-2", "ghost", 1), // unknown product
        envelope("l-3", "p1", 1),
    ];

    let response = post_batch(addr, batch).await;
    assert!(!response.success);
    assert_eq!(response.synced, 2);
    assert_eq!(response.failed, 1);

    let statuses: Vec<SaleSyncStatus> = response.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            SaleSyncStatus::Synced,
            SaleSyncStatus::Error,
            SaleSyncStatus::Synced
        ]
    );
    assert!(response.results[1].error.is_some());

    assert!(db.find_sale_id_by_local_id("l-1").await.unwrap().is_some());
    assert!(db.find_sale_id_by_local_id("l-2").await.unwrap().is_none());
    assert!(db.find_sale_id_by_local_id("l-3").await.unwrap().is_some());
}

#[tokio::test]
async fn checkout_rejects_insufficient_stock_with_conflict() {
    let (db, addr) = spawn_server().await;
    seed_product(&db, "p1", 1).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/sales"))
        .json(&envelope("l-online", "p1", 5))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");

    // Rejected before commit: stock and record of truth untouched.
    assert_eq!(db.get_product("p1").await.unwrap().unwrap().quantity, 1);
    assert!(db
        .find_sale_id_by_local_id("l-online")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn checkout_settles_and_double_submit_returns_same_sale() {
    let (db, addr) = spawn_server().await;
    seed_product(&db, "p1", 5).await;

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/sales");
    let env = envelope("l-online", "p1", 2);

    let first = client.post(&url).json(&env).send().await.unwrap();
    assert_eq!(first.status(), 200);
    let first_sale: serde_json::Value = first.json().await.unwrap();

    // Double-click / client retry: same local id resolves to the same sale.
    let second = client.post(&url).json(&env).send().await.unwrap();
    assert_eq!(second.status(), 200);
    let second_sale: serde_json::Value = second.json().await.unwrap();

    assert_eq!(first_sale["id"], second_sale["id"]);
    assert_eq!(db.get_product("p1").await.unwrap().unwrap().quantity, 3);
}

#[tokio::test]
async fn catalog_feeds_register_caches() {
    let (db, addr) = spawn_server().await;
    seed_product(&db, "p1", 7).await;
    seed_product(&db, "p2", 3).await;

    let products: Vec<Product> = reqwest::get(format!("http://{addr}/api/catalog"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(products.len(), 2);
    assert!(products.iter().any(|p| p.id == "p1" && p.quantity == 7));
}
