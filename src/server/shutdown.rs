//! Graceful shutdown coordinator
//!
//! Tracks active HTTP connections and coordinates the shutdown sequence:
//! stop accepting, drain connections with a timeout, then let the caller
//! close the remaining sessions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

/// Default time to wait for active connections to drain before closing
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;

/// Coordinator for graceful shutdown operations
pub struct ShutdownCoordinator {
    shutdown_initiated: AtomicBool,
    notify_tx: broadcast::Sender<()>,
    active_connections: AtomicU64,
    connections_drained: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (notify_tx, _) = broadcast::channel(16);
        Self {
            shutdown_initiated: AtomicBool::new(false),
            notify_tx,
            active_connections: AtomicU64::new(0),
            connections_drained: Arc::new(Notify::new()),
        }
    }

    /// Whether shutdown has been initiated; readiness reports the inverse
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Subscribe to the shutdown notification
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify_tx.subscribe()
    }

    /// Track a new connection
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Track a closed connection
    pub fn connection_closed(&self) {
        let prev = self.active_connections.fetch_sub(1, Ordering::Relaxed);
        if prev == 1 && self.is_shutting_down() {
            debug!("Last connection closed during shutdown");
            self.connections_drained.notify_waiters();
        }
    }

    /// Number of active connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Flag shutdown and wake everything waiting on [`subscribe`].
    /// Idempotent.
    ///
    /// [`subscribe`]: ShutdownCoordinator::subscribe
    pub fn initiate_shutdown(&self) {
        if self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already in progress");
            return;
        }
        info!(
            active_connections = self.active_connections(),
            "Initiating graceful shutdown"
        );
        let _ = self.notify_tx.send(());
    }

    /// Wait for active connections to close, up to `timeout`.
    /// Returns the number of connections still open when the wait ended.
    pub async fn drain_connections(&self, timeout: Duration) -> u64 {
        if self.active_connections() == 0 {
            return 0;
        }

        let wait = tokio::time::timeout(timeout, async {
            while self.active_connections() > 0 {
                self.connections_drained.notified().await;
            }
        })
        .await;

        let remaining = self.active_connections();
        if wait.is_err() && remaining > 0 {
            warn!(
                remaining_connections = remaining,
                "Connection drain timeout, closing remaining connections"
            );
        }
        remaining
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());
        assert_eq!(coordinator.active_connections(), 0);
    }

    #[test]
    fn test_connection_tracking() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.connection_opened();
        coordinator.connection_opened();
        assert_eq!(coordinator.active_connections(), 2);
        coordinator.connection_closed();
        assert_eq!(coordinator.active_connections(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_notifies_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        coordinator.initiate_shutdown();
        assert!(coordinator.is_shutting_down());
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate_shutdown();
        coordinator.initiate_shutdown();
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_drain_no_connections() {
        let coordinator = ShutdownCoordinator::new();
        let remaining = coordinator
            .drain_connections(Duration::from_millis(100))
            .await;
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_close() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        coordinator.connection_opened();
        coordinator.initiate_shutdown();

        let drainer = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator.drain_connections(Duration::from_secs(5)).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.connection_closed();

        assert_eq!(drainer.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drain_timeout_reports_remaining() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.connection_opened();
        coordinator.initiate_shutdown();

        let remaining = coordinator
            .drain_connections(Duration::from_millis(50))
            .await;
        assert_eq!(remaining, 1);
    }
}
