//! # Connectivity Monitor
//!
//! Tracks reachability of the server of record and exposes a single
//! debounced `online` signal.
//!
//! ## Signal Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Connectivity Monitor Inputs                          │
//! │                                                                         │
//! │  OS reachability events          Active health probe                   │
//! │  (edge-triggered, injected       GET /health, 3s hard timeout,         │
//! │   via the handle)                every 30s + immediately after an      │
//! │        │                         OS "online" edge                      │
//! │        │                                │                               │
//! │        ▼                                ▼                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      Monitor Task                               │   │
//! │  │                                                                 │   │
//! │  │  OS offline  ──► offline immediately ("went offline" event)    │   │
//! │  │  OS online   ──► probe first; only a successful probe flips    │   │
//! │  │                  the signal (OS signals are unreliable          │   │
//! │  │                  indicators of actual server reachability)      │   │
//! │  └──────────────────────────┬──────────────────────────────────────┘   │
//! │                             │                                           │
//! │            watch<bool> (level)   broadcast<ConnectivityEvent> (edges)  │
//! │                                                                         │
//! │  Late subscribers receive only future events, never replayed history.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The monitor is an explicitly constructed instance owned by application
//! startup and handed to the scheduler - never ambient global state.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::ProbeSettings;

// =============================================================================
// Connectivity Event
// =============================================================================

/// Edge event emitted when the online signal changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The server answered a probe; reconciliation may be attempted.
    /// Callers must still handle request failure - online is a hint,
    /// not a guarantee.
    Online,
    /// The server became unreachable.
    Offline,
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for querying and feeding the connectivity monitor.
#[derive(Clone)]
pub struct ConnectivityHandle {
    online_rx: watch::Receiver<bool>,
    events_tx: broadcast::Sender<ConnectivityEvent>,
    os_tx: mpsc::Sender<bool>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ConnectivityHandle {
    /// Current debounced online state.
    pub fn is_online(&self) -> bool {
        *self.online_rx.borrow()
    }

    /// A watch receiver over the online level signal.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.online_rx.clone()
    }

    /// Subscribes to future connectivity edges. Dropping the receiver
    /// unsubscribes; no history is replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events_tx.subscribe()
    }

    /// Injects an OS reachability edge (`true` = interface up).
    pub async fn report_os_event(&self, up: bool) {
        if self.os_tx.send(up).await.is_err() {
            warn!("Connectivity monitor is gone; OS event dropped");
        }
    }

    /// Stops the monitor task.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Connectivity monitor task. Spawn [`ConnectivityMonitor::run`] on the
/// runtime and keep the handle.
pub struct ConnectivityMonitor {
    client: reqwest::Client,
    health_url: String,
    probe_interval: Duration,
    probe_timeout: Duration,
    online_tx: watch::Sender<bool>,
    events_tx: broadcast::Sender<ConnectivityEvent>,
    os_rx: mpsc::Receiver<bool>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ConnectivityMonitor {
    /// Creates a monitor probing `health_url` and returns it with its handle.
    ///
    /// The monitor starts offline; the first probe fires immediately after
    /// [`run`](Self::run) starts.
    pub fn new(health_url: impl Into<String>, settings: &ProbeSettings) -> (Self, ConnectivityHandle) {
        let (online_tx, online_rx) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(16);
        let (os_tx, os_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let monitor = ConnectivityMonitor {
            client: reqwest::Client::new(),
            health_url: health_url.into(),
            probe_interval: settings.interval(),
            probe_timeout: settings.timeout(),
            online_tx,
            events_tx: events_tx.clone(),
            os_rx,
            shutdown_rx,
        };

        let handle = ConnectivityHandle {
            online_rx,
            events_tx,
            os_tx,
            shutdown_tx,
        };

        (monitor, handle)
    }

    /// Runs the monitor loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(url = %self.health_url, "Connectivity monitor starting");

        let mut interval = tokio::time::interval(self.probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Periodic probe; the first tick fires immediately.
                _ = interval.tick() => {
                    let up = self.probe().await;
                    self.set_online(up);
                }

                // OS reachability edges.
                Some(up) = self.os_rx.recv() => {
                    if up {
                        // An OS "online" edge only earns trust after a probe.
                        debug!("OS reports online, probing server");
                        let up = self.probe().await;
                        self.set_online(up);
                    } else {
                        self.set_online(false);
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Connectivity monitor shutting down");
                    break;
                }
            }
        }
    }

    /// One probe round-trip within the hard timeout.
    async fn probe(&self) -> bool {
        let result = self
            .client
            .get(&self.health_url)
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        }
    }

    /// Updates the level signal, broadcasting an edge only on change.
    fn set_online(&self, online: bool) {
        let changed = self.online_tx.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });

        if changed {
            let event = if online {
                ConnectivityEvent::Online
            } else {
                ConnectivityEvent::Offline
            };
            info!(online, "Connectivity changed");
            // No subscribers is fine; edges are not queued for later.
            let _ = self.events_tx.send(event);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_offline() {
        let (_monitor, handle) =
            ConnectivityMonitor::new("http://127.0.0.1:1/health", &ProbeSettings::default());
        assert!(!handle.is_online());
    }

    #[tokio::test]
    async fn test_probe_failure_keeps_offline_without_event() {
        // Port 1 is never listening; the probe fails fast.
        let settings = ProbeSettings {
            interval_secs: 1,
            timeout_secs: 1,
        };
        let (monitor, handle) = ConnectivityMonitor::new("http://127.0.0.1:1/health", &settings);
        let mut events = handle.subscribe();

        tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!handle.is_online());
        // offline -> offline is debounced: no edge was broadcast.
        assert!(events.try_recv().is_err());
        handle.shutdown().await;
    }
}
