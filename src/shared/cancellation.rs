//! Cancellation signalling
//!
//! A [`CancellationSignal`] is a cloneable, fire-once flag. The EVSE uses one
//! to tie its background tasks to its own lifetime; callers pass one with a
//! command to abandon it before completion. The CLI binds one to Ctrl+C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

/// Cancellation signal that can be cloned and shared across tasks
#[derive(Clone, Debug)]
pub struct CancellationSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Fire the signal. Only the first call has an effect.
    pub fn cancel(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.sender.send(());
        }
    }

    /// Resolve once the signal has fired (immediately if it already has).
    pub async fn cancelled(&self) {
        // Subscribe before checking the flag so a concurrent `cancel` is never missed.
        let mut rx = self.sender.subscribe();
        if self.is_cancelled() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// A child signal fired whenever this one fires, but cancellable on its own.
    pub fn child(&self) -> CancellationSignal {
        let child = CancellationSignal::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }
        let parent = self.clone();
        let linked = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => linked.cancel(),
                _ = linked.cancelled() => {}
            }
        });
        child
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Fire `signal` on SIGTERM / SIGINT (Ctrl+C on non-unix targets).
pub async fn cancel_on_ctrl_c(signal: CancellationSignal) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let mut sigterm = unix_signal(SignalKind::terminate())?;
        let mut sigint = unix_signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("📡 Received SIGTERM signal"),
            _ = sigint.recv() => info!("📡 Received SIGINT signal (Ctrl+C)"),
            _ = signal.cancelled() => return Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("📡 Received Ctrl+C signal");
            }
            _ = signal.cancelled() => return Ok(()),
        }
    }

    signal.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let signal = CancellationSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        signal.cancel();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("Timeout")
            .expect("Join failed");
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_fired() {
        let signal = CancellationSignal::new();
        signal.cancel();
        signal.cancel();
        tokio::time::timeout(Duration::from_millis(50), signal.cancelled())
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn child_follows_parent_but_not_vice_versa() {
        let parent = CancellationSignal::new();
        let child = parent.child();

        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        tokio::time::timeout(Duration::from_millis(200), other.cancelled())
            .await
            .expect("child should fire with parent");
    }
}
