//! # Sync Scheduler
//!
//! Decides *when* to attempt reconciliation and serializes attempts to
//! exactly one in-flight sync.
//!
//! ## State Machine & Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Scheduler                                   │
//! │                                                                         │
//! │           ┌──────┐   trigger    ┌─────────┐                             │
//! │           │ idle │ ───────────► │ syncing │                             │
//! │           └──────┘              └────┬────┘                             │
//! │               ▲        success /     │                                  │
//! │               └──────  error  ───────┘                                  │
//! │                                                                         │
//! │  TRIGGERS                                                              │
//! │  ────────                                                              │
//! │  1. Connectivity "online" edge, after a settle delay (~2s) so a        │
//! │     flapping connection doesn't race the first attempt                 │
//! │  2. Fixed interval + explicit jitter, while idle and online            │
//! │  3. trigger_now() on the handle (cashier / API request)                │
//! │                                                                         │
//! │  CONCURRENCY                                                           │
//! │  ───────────                                                           │
//! │  At most one sync in flight; a trigger received while syncing is a     │
//! │  no-op (dropped, not queued). The guard is an explicit try_lock in     │
//! │  the reconcile client, not an accident of task ordering.               │
//! │                                                                         │
//! │  A sync interrupted by process death leaves PendingSales untouched;    │
//! │  the store's mark-then-delete protocol makes resume safe.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::CatalogClient;
use crate::config::SyncSettings;
use crate::connectivity::{ConnectivityEvent, ConnectivityHandle};
use crate::error::RegisterError;
use crate::reconcile::{ReconcileClient, SyncOutcome};

// =============================================================================
// Scheduler Status
// =============================================================================

/// Scheduler state visible to the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Syncing,
}

/// Snapshot of the scheduler for status queries.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Last successful sync completion.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Outcome of the last completed attempt.
    pub last_outcome: Option<SyncOutcome>,
    /// Error message of the last failed attempt, cleared on success.
    pub last_error: Option<String>,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        SchedulerStatus {
            state: SchedulerState::Idle,
            last_sync_at: None,
            last_outcome: None,
            last_error: None,
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for controlling a running scheduler.
#[derive(Clone)]
pub struct SyncSchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl SyncSchedulerHandle {
    /// Requests an immediate sync attempt.
    ///
    /// Returns `false` when the request was coalesced into one already
    /// queued (or the scheduler is gone) - never blocks, never queues more
    /// than one.
    pub fn trigger_now(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Current scheduler status snapshot.
    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Stops the scheduler task.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// The scheduler task. Spawn [`SyncScheduler::run`] on the runtime.
pub struct SyncScheduler {
    reconciler: Arc<ReconcileClient>,
    catalog: Option<Arc<CatalogClient>>,
    connectivity: ConnectivityHandle,
    settings: SyncSettings,
    status: Arc<RwLock<SchedulerStatus>>,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SyncScheduler {
    /// Creates a scheduler and its handle.
    ///
    /// `catalog` is optional: when present, the cache is refreshed
    /// opportunistically after each successful sync.
    pub fn new(
        reconciler: Arc<ReconcileClient>,
        catalog: Option<Arc<CatalogClient>>,
        connectivity: ConnectivityHandle,
        settings: SyncSettings,
    ) -> (Self, SyncSchedulerHandle) {
        // Capacity 1: a second trigger while one is queued is coalesced.
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let status = Arc::new(RwLock::new(SchedulerStatus::default()));

        let scheduler = SyncScheduler {
            reconciler,
            catalog,
            connectivity,
            settings,
            status: status.clone(),
            trigger_rx,
            shutdown_rx,
        };

        let handle = SyncSchedulerHandle {
            trigger_tx,
            shutdown_tx,
            status,
        };

        (scheduler, handle)
    }

    /// Runs the scheduler loop. Spawn as a background task.
    pub async fn run(mut self) {
        let period = jittered_period(&self.settings);
        info!(period_ms = period.as_millis() as u64, "Sync scheduler starting");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut events = self.connectivity.subscribe();
        let mut events_open = true;

        loop {
            tokio::select! {
                // Periodic attempt while online; the first tick also serves
                // as the startup catch-up.
                _ = interval.tick() => {
                    if self.connectivity.is_online() {
                        self.run_sync("interval").await;
                    }
                }

                // Reconnect trigger, after the settle delay.
                event = events.recv(), if events_open => {
                    match event {
                        Ok(ConnectivityEvent::Online) => {
                            debug!(
                                delay_ms = self.settings.settle_delay_ms,
                                "Back online, settling before sync"
                            );
                            tokio::time::sleep(self.settings.settle_delay()).await;
                            self.run_sync("reconnect").await;
                        }
                        Ok(ConnectivityEvent::Offline) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Connectivity events lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            warn!("Connectivity monitor gone; interval triggers remain");
                            events_open = false;
                        }
                    }
                }

                // Manual trigger.
                Some(_) = self.trigger_rx.recv() => {
                    self.run_sync("manual").await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Sync scheduler shutting down");
                    break;
                }
            }
        }
    }

    async fn run_sync(&mut self, reason: &str) {
        {
            self.status.write().await.state = SchedulerState::Syncing;
        }

        let result = self.reconciler.sync_once().await;

        {
            let mut status = self.status.write().await;
            status.state = SchedulerState::Idle;
            match &result {
                Ok(outcome) => {
                    status.last_sync_at = Some(Utc::now());
                    status.last_outcome = Some(*outcome);
                    status.last_error = None;
                    info!(reason, synced = outcome.synced, failed = outcome.failed, "Sync finished");
                }
                Err(RegisterError::SyncInProgress) => {
                    debug!(reason, "Sync already in flight, trigger dropped");
                }
                Err(e) => {
                    status.last_error = Some(e.to_string());
                    warn!(reason, error = %e, "Sync attempt failed");
                }
            }
        }

        // Triggers that piled up while we were syncing are stale now.
        while self.trigger_rx.try_recv().is_ok() {}

        // Server just answered: opportunistically refresh the catalog cache.
        if result.is_ok() {
            if let Some(catalog) = &self.catalog {
                if let Err(e) = catalog.refresh().await {
                    debug!(error = %e, "Opportunistic catalog refresh failed");
                }
            }
        }
    }
}

/// Interval plus a per-process jitter so a fleet of registers that lost
/// power together doesn't stampede the server in lockstep afterwards.
fn jittered_period(settings: &SyncSettings) -> Duration {
    let base = Duration::from_secs(settings.interval_secs);
    if settings.jitter_secs == 0 {
        return base;
    }
    let jitter_window_ms = settings.jitter_secs * 1_000;
    let jitter_ms = u64::from(Utc::now().timestamp_subsec_micros()) % jitter_window_ms;
    base + Duration::from_millis(jitter_ms)
}

// =============================================================================
// Unit Tests
// =============================================================================
