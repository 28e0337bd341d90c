//! Graceful shutdown coordination
//!
//! A watch channel fans the shutdown flag out to the dispatcher, the
//! recovery actors and the status server. In-flight probes and actions get
//! a bounded grace period to finish; after that the supervisor aborts what
//! remains, so no event is emitted past shutdown.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Default grace period for in-flight work.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Receiver observing the shutdown flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Flip the flag. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Block until SIGINT or SIGTERM, then trigger shutdown.
    pub async fn listen_for_signals(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("failed to listen for SIGTERM: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT; shutting down"),
            _ = terminate => info!("received SIGTERM; shutting down"),
        }
        self.trigger();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
