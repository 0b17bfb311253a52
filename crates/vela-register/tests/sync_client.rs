//! Client-side reconciliation behavior against a stub ingestion server.
//!
//! The stub speaks the bulk sync wire contract and lets each test script
//! per-sale outcomes, so these tests pin down exactly how the register
//! reacts to partial batches, duplicate acks and transport failures.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tokio::sync::Mutex;

use vela_core::{
    HealthStatus, PaymentMethod, SaleDraft, SaleLine, SaleSyncResult, SyncSalesRequest,
    SyncSalesResponse, SyncState,
};
use vela_register::{
    ConnectivityEvent, ConnectivityMonitor, ProbeSettings, ReconcileClient, RegisterConfig,
    RegisterError, SaleStore,
};

// =============================================================================
// Stub Ingestion Server
// =============================================================================

#[derive(Default)]
struct StubState {
    /// Local ids the stub rejects with a per-item error.
    fail_ids: HashSet<String>,
    /// Local ids the stub acknowledges as already recorded.
    known_ids: HashSet<String>,
    /// Every batch the stub received.
    batches: Vec<SyncSalesRequest>,
    /// Artificial processing delay per batch.
    delay: Duration,
}

type SharedStub = Arc<Mutex<StubState>>;

async fn stub_sync(
    State(stub): State<SharedStub>,
    Json(request): Json<SyncSalesRequest>,
) -> Json<SyncSalesResponse> {
    let delay = {
        let mut state = stub.lock().await;
        state.batches.push(request.clone());
        state.delay
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut state = stub.lock().await;
    let results = request
        .sales
        .iter()
        .map(|sale| {
            if state.fail_ids.contains(&sale.local_id) {
                SaleSyncResult::error(&sale.local_id, "validation failed")
            } else if state.known_ids.contains(&sale.local_id) {
                SaleSyncResult::already_synced(&sale.local_id, Some("srv-dup".into()))
            } else {
                state.known_ids.insert(sale.local_id.clone());
                SaleSyncResult::synced(&sale.local_id, format!("srv-{}", sale.local_id))
            }
        })
        .collect();

    Json(SyncSalesResponse::from_results(results))
}

async fn stub_health() -> Json<HealthStatus> {
    Json(HealthStatus::ok(Utc::now()))
}

async fn spawn_stub(stub: SharedStub) -> SocketAddr {
    let app = Router::new()
        .route("/api/sync/sales", post(stub_sync))
        .route("/health", get(stub_health))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> RegisterConfig {
    let mut config = RegisterConfig::default();
    config.server.base_url = format!("http://{addr}");
    config
}

fn draft(code: &str, total: i64) -> SaleDraft {
    SaleDraft {
        local_id: None,
        lines: vec![SaleLine {
            product_id: format!("p-{code}"),
            name: format!("Product {code}"),
            code: code.to_string(),
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

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn partial_batch_purges_only_acknowledged_sales() {
    let stub: SharedStub = Default::default();
    let store = SaleStore::in_memory().await.unwrap();

    let first = store.put(draft("A", 10_000)).await.unwrap();
    let second = store.put(draft("B", 20_000)).await.unwrap();
    let third = store.put(draft("C", 30_000)).await.unwrap();

    stub.lock().await.fail_ids.insert(second.local_id.clone());
    let addr = spawn_stub(stub.clone()).await;

    let client = ReconcileClient::new(store.clone(), &config_for(addr));
    let outcome = client.sync_once().await.unwrap();

    assert_eq!(outcome.synced, 2);
    assert_eq!(outcome.failed, 1);

    // Items 1 and 3 purged; item 2 stays, reset to unsynced for retry.
    assert!(store.get(&first.local_id).await.unwrap().is_none());
    assert!(store.get(&third.local_id).await.unwrap().is_none());
    let kept = store.get(&second.local_id).await.unwrap().unwrap();
    assert_eq!(kept.sync_state, SyncState::Unsynced);
}

#[tokio::test]
async fn already_synced_sales_are_purged_like_synced_ones() {
    let stub: SharedStub = Default::default();
    let store = SaleStore::in_memory().await.unwrap();

    let sale = store.put(draft("A", 10_000)).await.unwrap();
    stub.lock().await.known_ids.insert(sale.local_id.clone());
    let addr = spawn_stub(stub).await;

    let client = ReconcileClient::new(store.clone(), &config_for(addr));
    let outcome = client.sync_once().await.unwrap();

    assert_eq!(outcome.synced, 1);
    assert_eq!(outcome.failed, 0);
    assert!(store.get(&sale.local_id).await.unwrap().is_none());
}

#[tokio::test]
async fn transport_failure_leaves_every_sale_untouched() {
    let store = SaleStore::in_memory().await.unwrap();
    let sale = store.put(draft("A", 10_000)).await.unwrap();

    // Nothing listens on port 1: the whole batch fails at the transport.
    let mut config = RegisterConfig::default();
    config.server.base_url = "http://127.0.0.1:1".into();

    let client = ReconcileClient::new(store.clone(), &config);
    let err = client.sync_once().await.unwrap_err();
    assert!(err.is_retryable());

    let kept = store.get(&sale.local_id).await.unwrap().unwrap();
    assert_eq!(kept.sync_state, SyncState::Unsynced);
    assert_eq!(store.count_unsynced().await.unwrap(), 1);
}

#[tokio::test]
async fn sync_once_is_non_reentrant() {
    let stub: SharedStub = Default::default();
    stub.lock().await.delay = Duration::from_millis(300);
    let store = SaleStore::in_memory().await.unwrap();
    store.put(draft("A", 10_000)).await.unwrap();

    let addr = spawn_stub(stub).await;
    let client = Arc::new(ReconcileClient::new(store, &config_for(addr)));

    let racing = client.clone();
    let first = tokio::spawn(async move { racing.sync_once().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The overlapping call is a no-op, not a queued second sync.
    let second = client.sync_once().await;
    assert!(matches!(second, Err(RegisterError::SyncInProgress)));

    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.synced, 1);
}

#[tokio::test]
async fn retrying_a_failed_sale_succeeds_later() {
    let stub: SharedStub = Default::default();
    let store = SaleStore::in_memory().await.unwrap();
    let sale = store.put(draft("A", 10_000)).await.unwrap();

    stub.lock().await.fail_ids.insert(sale.local_id.clone());
    let addr = spawn_stub(stub.clone()).await;

    let client = ReconcileClient::new(store.clone(), &config_for(addr));
    let outcome = client.sync_once().await.unwrap();
    assert_eq!(outcome.failed, 1);

    // The server-side problem clears up; the next attempt drains the queue.
    stub.lock().await.fail_ids.clear();
    let outcome = client.sync_once().await.unwrap();
    assert_eq!(outcome.synced, 1);
    assert_eq!(store.count_unsynced().await.unwrap(), 0);

    // Two batches were sent in total.
    assert_eq!(stub.lock().await.batches.len(), 2);
}

#[tokio::test]
async fn monitor_comes_online_after_successful_probe() {
    let stub: SharedStub = Default::default();
    let addr = spawn_stub(stub).await;

    let settings = ProbeSettings {
        interval_secs: 60, // first tick fires immediately, then far apart
        timeout_secs: 1,
    };
    let (monitor, handle) =
        ConnectivityMonitor::new(format!("http://{addr}/health"), &settings);
    let mut events = handle.subscribe();
    tokio::spawn(monitor.run());

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no connectivity event")
        .unwrap();
    assert_eq!(event, ConnectivityEvent::Online);
    assert!(handle.is_online());

    handle.shutdown().await;
}
