//! Graceful shutdown for the ADS server.
//!
//! Shutdown is broadcast to every connection task over a `watch` channel.
//! Each connection task holds a [`DrainGuard`]; the controller waits for all
//! guards to drop, bounded by a grace period.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Coordinates server shutdown and connection draining.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    initiated: AtomicBool,
    tx: watch::Sender<bool>,
    active: AtomicUsize,
    drained: Notify,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ShutdownInner {
                initiated: AtomicBool::new(false),
                tx,
                active: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    /// Subscribe to the shutdown broadcast.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.inner.initiated.load(Ordering::SeqCst)
    }

    /// Track a connection until the returned guard drops.
    pub fn track_connection(&self) -> DrainGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        DrainGuard {
            controller: self.clone(),
        }
    }

    /// Number of tracked connections.
    pub fn active_connections(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Broadcast shutdown and wait for connections to drain.
    ///
    /// Returns `true` if every connection finished within `grace_period`.
    /// Later calls return immediately.
    pub async fn shutdown(&self, grace_period: Duration) -> bool {
        if self
            .inner
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return true;
        }

        info!(grace_period = ?grace_period, "initiating graceful shutdown");
        self.inner.tx.send_replace(true);

        match timeout(grace_period, self.wait_drained()).await {
            Ok(()) => {
                info!("all connections drained");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.active_connections(),
                    "grace period elapsed with connections still open"
                );
                false
            }
        }
    }

    async fn wait_drained(&self) {
        loop {
            let drained = self.inner.drained.notified();
            if self.active_connections() == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Keeps a connection counted as active until dropped.
#[derive(Debug)]
pub struct DrainGuard {
    controller: ShutdownController,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.controller.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.controller.inner.drained.notify_waiters();
        }
    }
}

/// Wait until a shutdown receiver reports shutdown.
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|initiated| *initiated).await.map(|_| ());
}

/// Wait for OS shutdown signals (SIGTERM, SIGINT).
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "failed to install signal handlers");
                    std::future::pending::<()>().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C"),
            Err(e) => {
                error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    }
}
