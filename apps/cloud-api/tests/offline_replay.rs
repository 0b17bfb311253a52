//! End-to-end offline replay: a real register runtime against a real server.
//!
//! Covers the headline scenario - a sale rung up while offline is carried by
//! the local queue, reconciled within one scheduler cycle of connectivity
//! returning, purged only after acknowledgement, and immune to duplicate
//! resends - plus the commit-then-lost-response retry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use vela_cloud_api::db::Database;
use vela_cloud_api::notify::NoOpNotifier;
use vela_cloud_api::{api, AppState};
use vela_core::{
    PaymentMethod, Product, SaleDraft, SaleEnvelope, SaleLine, SaleSyncStatus, SyncSalesRequest,
    SyncSalesResponse,
};
use vela_register::{RegisterConfig, RegisterService, ReconcileClient, SaleStore};

// =============================================================================
// Fixtures
// =============================================================================

async fn server_on(addr: SocketAddr) -> Database {
    let db = Database::in_memory().await.unwrap();
    db.upsert_product(&Product {
        id: "p-espresso".into(),
        code: "ESP".into(),
        name: "Espresso blend 1kg".into(),
        price_minor: 75_000,
        quantity: 20,
    })
    .await
    .unwrap();

    let state = AppState::new(db.clone(), Arc::new(NoOpNotifier));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::router(state)).await.unwrap();
    });
    db
}

fn fast_config(addr: SocketAddr) -> RegisterConfig {
    let mut config = RegisterConfig::default();
    config.server.base_url = format!("http://{addr}");
    config.probe.interval_secs = 1;
    config.probe.timeout_secs = 1;
    config.sync.interval_secs = 1;
    config.sync.jitter_secs = 0;
    config.sync.settle_delay_ms = 100;
    config
}

fn offline_draft() -> SaleDraft {
    SaleDraft {
        local_id: None,
        lines: vec![
            SaleLine {
                product_id: "p-espresso".into(),
                name: "Espresso blend 1kg".into(),
                code: "ESP".into(),
                unit_price_minor: 75_000,
                quantity: 2,
            },
        ],
        total_minor: 150_000,
        amount_paid_minor: None,
        payment_method: PaymentMethod::Cash,
        customer_id: None,
        is_return: false,
    }
}

async fn wait_until_drained(service: &RegisterService) {
    for _ in 0..100 {
        if service.status().await.unwrap().pending_count == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("pending sales were never reconciled");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn offline_sale_reconciles_after_reconnect_and_resists_duplicates() {
    // Reserve an address, then leave it dark: the register starts offline.
    let reserved = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let store = SaleStore::in_memory().await.unwrap();
    let service = RegisterService::start(store.clone(), &fast_config(addr)).unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!service.status().await.unwrap().online);

    // Offline sale of 2 items totaling 150,000: immediate local success.
    let sale = service.record_sale(offline_draft()).await.unwrap();
    assert_eq!(service.status().await.unwrap().pending_count, 1);

    // Connectivity returns.
    let server_db = server_on(addr).await;
    service.report_os_event(true).await;

    // Within one scheduler cycle the sale is sent, acknowledged and purged.
    wait_until_drained(&service).await;
    let server_sale_id = server_db
        .find_sale_id_by_local_id(&sale.local_id)
        .await
        .unwrap()
        .expect("sale never reached the server");

    // Stock was decremented on the server of record.
    let product = server_db.get_product("p-espresso").await.unwrap().unwrap();
    assert_eq!(product.quantity, 18);

    // Forced duplicate resend of the identical local id: already_synced and
    // no new Sale exists.
    let response: SyncSalesResponse = reqwest::Client::new()
        .post(format!("http://{addr}/api/sync/sales"))
        .json(&SyncSalesRequest {
            sales: vec![SaleEnvelope {
                local_id: sale.local_id.clone(),
                items: sale.lines.clone(),
                total_minor: sale.total_minor,
                amount_paid_minor: sale.amount_paid_minor,
                payment_method: sale.payment_method,
                customer_id: sale.customer_id.clone(),
                is_return: sale.is_return,
                created_at: sale.created_at,
            }],
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response.results[0].status, SaleSyncStatus::AlreadySynced);
    assert_eq!(
        response.results[0].sale_id.as_deref(),
        Some(server_sale_id.as_str())
    );
    let product = server_db.get_product("p-espresso").await.unwrap().unwrap();
    assert_eq!(product.quantity, 18, "duplicate resend must not move stock");

    service.shutdown().await;
}

#[tokio::test]
async fn lost_response_after_commit_does_not_duplicate_the_sale() {
    // Server is up the whole time; this test simulates the client losing the
    // response of a batch the server already committed.
    let reserved = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);
    let server_db = server_on(addr).await;

    let store = SaleStore::in_memory().await.unwrap();
    let sale = store.put(offline_draft()).await.unwrap();

    // First submission: the server commits, but pretend the response was
    // lost before the client could mark anything.
    let _committed: SyncSalesResponse = reqwest::Client::new()
        .post(format!("http://{addr}/api/sync/sales"))
        .json(&SyncSalesRequest {
            sales: vec![SaleEnvelope::from(&sale)],
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(store.count_unsynced().await.unwrap(), 1, "client saw nothing");

    // The retry goes through the normal reconciliation path: the server
    // answers already_synced, the client purges, and exactly one Sale exists.
    let client = ReconcileClient::new(store.clone(), &fast_config(addr));
    let outcome = client.sync_once().await.unwrap();
    assert_eq!(outcome.synced, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(store.count_unsynced().await.unwrap(), 0);

    assert!(server_db
        .find_sale_id_by_local_id(&sale.local_id)
        .await
        .unwrap()
        .is_some());
    // Stock moved exactly once for the one settled sale.
    let product = server_db.get_product("p-espresso").await.unwrap().unwrap();
    assert_eq!(product.quantity, 18);
}
