//! External cancellation of a run.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Cloneable cancellation signal shared by everything taking part in a run.
///
/// Cancellation is sticky: once cancelled, a signal stays cancelled.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Cancel once `timeout` has elapsed. Must be called within a tokio runtime.
    pub fn cancel_after(&self, timeout: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            this.cancel();
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` if cancelled.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
