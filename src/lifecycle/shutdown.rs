//! Shutdown coordination for the gateway.

use std::future::Future;

use tokio::sync::broadcast;
use tracing::info;

/// Coordinator for graceful shutdown.
///
/// Hands out futures that resolve once shutdown is triggered; the server
/// loop drives axum's graceful-shutdown path with one, long-lived socket
/// handlers may hold others. Triggering is idempotent.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Coordinator wired to ctrl-c: the signal listener is spawned here so
    /// callers only ever see [`Shutdown::triggered`].
    pub fn on_ctrl_c() -> Self {
        let shutdown = Self::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                trigger.trigger();
            }
        });
        shutdown
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// A future that resolves once shutdown has been triggered.
    pub fn triggered(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
