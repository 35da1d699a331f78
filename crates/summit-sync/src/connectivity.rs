//! # Connectivity Monitor
//!
//! Debounced network reachability tracking.
//!
//! ## Debounce Behavior
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reachability Debouncing                              │
//! │                                                                         │
//! │  raw edges:      offline ──► online ──► offline ──► online              │
//! │                     │          │           │           │                │
//! │                     │          │◄──flap────┘           │                │
//! │                     │          within window           │                │
//! │                     ▼                                  ▼                │
//! │  published:      offline ──────────────────────────► online             │
//! │                                          (held for debounce_ms)         │
//! │                                                                         │
//! │  A raw state must HOLD for the debounce window before a transition      │
//! │  is published; flapping inside the window is absorbed, so the           │
//! │  coordinator never starts a drain cycle it would immediately abort.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The monitor is an explicit instance injected into the coordinator —
//! no ambient global connectivity state. The platform layer feeds raw
//! edges through [`ConnectivityHandle::report`]; subscribers get
//! published transitions through callbacks or a watch channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ConnectivitySettings;

// =============================================================================
// Subscription
// =============================================================================

type SubscriberFn = Box<dyn Fn(bool) + Send + Sync>;
type SubscriberMap = Arc<Mutex<HashMap<u64, SubscriberFn>>>;

/// A callback subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    subscribers: SubscriberMap,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut map) = self.subscribers.lock() {
            map.remove(&self.id);
        }
    }
}

// =============================================================================
// Connectivity Handle
// =============================================================================

/// Handle to a running connectivity monitor.
#[derive(Clone)]
pub struct ConnectivityHandle {
    /// Raw reachability edges from the platform layer.
    raw_tx: mpsc::Sender<bool>,

    /// Published (debounced) state.
    state_rx: watch::Receiver<bool>,

    /// Callback subscribers.
    subscribers: SubscriberMap,

    /// Subscription id counter.
    next_id: Arc<AtomicU64>,

    /// Shutdown sender.
    shutdown_tx: mpsc::Sender<()>,
}

impl ConnectivityHandle {
    /// Last published reachability state.
    pub fn is_online(&self) -> bool {
        *self.state_rx.borrow()
    }

    /// Feeds a raw reachability edge from the platform layer. The edge
    /// is published only after it holds for the debounce window.
    pub async fn report(&self, online: bool) {
        let _ = self.raw_tx.send(online).await;
    }

    /// Registers a callback fired on each published transition. The
    /// returned [`Subscription`] unsubscribes on drop.
    pub fn subscribe(&self, f: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.subscribers.lock() {
            map.insert(id, Box::new(f));
        }
        Subscription {
            id,
            subscribers: self.subscribers.clone(),
        }
    }

    /// Channel-based feed of published transitions, consumed by the
    /// coordinator.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state_rx.clone()
    }

    /// Stops the monitor task.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Connectivity Monitor
// =============================================================================

/// Debounced reachability monitor.
pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    /// Spawns the monitor task. The initial published state is offline
    /// until the platform layer reports otherwise.
    pub fn spawn(settings: ConnectivitySettings) -> ConnectivityHandle {
        let (raw_tx, raw_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));

        let handle = ConnectivityHandle {
            raw_tx,
            state_rx,
            subscribers: subscribers.clone(),
            next_id: Arc::new(AtomicU64::new(0)),
            shutdown_tx,
        };

        tokio::spawn(Self::run(
            settings,
            raw_rx,
            state_tx,
            subscribers,
            shutdown_rx,
        ));

        handle
    }

    /// Monitor task loop: track raw edges, publish held states.
    async fn run(
        settings: ConnectivitySettings,
        mut raw_rx: mpsc::Receiver<bool>,
        state_tx: watch::Sender<bool>,
        subscribers: SubscriberMap,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let debounce = Duration::from_millis(settings.debounce_ms);

        let mut published = false;
        let mut reported = false;
        let mut deadline = Instant::now();
        let mut armed = false;

        info!(debounce_ms = settings.debounce_ms, "Connectivity monitor started");

        loop {
            tokio::select! {
                maybe_edge = raw_rx.recv() => {
                    let Some(state) = maybe_edge else { break };
                    if state == reported {
                        continue;
                    }
                    reported = state;

                    if reported == published {
                        // Flapped back inside the window; absorb it.
                        debug!(online = state, "Reachability flap absorbed");
                        armed = false;
                    } else {
                        debug!(online = state, "Reachability edge, debouncing");
                        deadline = Instant::now() + debounce;
                        armed = true;
                    }
                }

                _ = tokio::time::sleep_until(deadline), if armed => {
                    armed = false;
                    published = reported;
                    info!(online = published, "Connectivity transition published");

                    let _ = state_tx.send(published);

                    if let Ok(map) = subscribers.lock() {
                        for subscriber in map.values() {
                            subscriber(published);
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        info!("Connectivity monitor stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(debounce_ms: u64) -> ConnectivitySettings {
        ConnectivitySettings { debounce_ms }
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_state_is_published_after_window() {
        let handle = ConnectivityMonitor::spawn(settings(1_000));
        assert!(!handle.is_online());

        let mut rx = handle.watch();
        handle.report(true).await;

        // Transition arrives once the state has held for the window.
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(handle.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flap_inside_window_is_absorbed() {
        let handle = ConnectivityMonitor::spawn(settings(1_000));

        handle.report(true).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.report(false).await;

        // Well past the original deadline: nothing was published.
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(!handle.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_receive_transitions() {
        let handle = ConnectivityMonitor::spawn(settings(100));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = handle.subscribe(move |online| {
            sink.lock().unwrap().push(online);
        });

        handle.report(true).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.report(false).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(seen.lock().unwrap().clone(), vec![true, false]);

        // Dropping the subscription unsubscribes.
        drop(subscription);
        handle.report(true).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_reports_do_not_republish() {
        let handle = ConnectivityMonitor::spawn(settings(100));
        let mut rx = handle.watch();

        handle.report(true).await;
        rx.changed().await.unwrap();

        handle.report(true).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        // No second transition pending.
        assert!(!rx.has_changed().unwrap());
    }
}
