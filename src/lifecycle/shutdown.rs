//! Shutdown coordination for the proxy.

use std::sync::Arc;

use tokio::sync::watch;

/// A one-way latch that long-running tasks can observe.
///
/// Unlike a broadcast channel, late subscribers still see a trigger that
/// already happened.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered latch.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the latch.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Trigger the latch. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Resolve once `rx` reads `true`, or never if the sender is gone.
///
/// Returns `()` rather than the `watch::Ref`, so the read guard is never held
/// across another await in a `select!`.
pub async fn triggered(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
