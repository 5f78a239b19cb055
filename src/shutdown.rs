//! Shutdown requests shared between signal handlers and the collector.
//!
//! The state is a single atomic, so a request can be raised from any task or
//! thread without locking. Waiters are woken through a [`Notify`] and never
//! poll.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const RUNNING: u8 = 0;
const TERMINATE: u8 = 1;
const INTERRUPT: u8 = 2;

/// Why the service was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    /// External termination (SIGTERM); a final collection is attempted.
    Terminate,
    /// Direct user interrupt (Ctrl-C); exit without a final collection.
    Interrupt,
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    state: AtomicU8,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request and wake every waiter.
    ///
    /// An interrupt overrides a pending terminate; a terminate never
    /// downgrades an interrupt.
    pub fn request(&self, kind: ShutdownKind) {
        match kind {
            ShutdownKind::Terminate => {
                let _ = self.inner.state.compare_exchange(
                    RUNNING,
                    TERMINATE,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
            ShutdownKind::Interrupt => self.inner.state.store(INTERRUPT, Ordering::SeqCst),
        }
        self.inner.notify.notify_waiters();
    }

    pub fn requested(&self) -> Option<ShutdownKind> {
        match self.inner.state.load(Ordering::SeqCst) {
            TERMINATE => Some(ShutdownKind::Terminate),
            INTERRUPT => Some(ShutdownKind::Interrupt),
            _ => None,
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested().is_some()
    }

    /// Sleep for `timeout` unless a shutdown is requested first.
    ///
    /// Returns the request that cut the wait short, or `None` when the full
    /// timeout elapsed.
    pub async fn wait(&self, timeout: Duration) -> Option<ShutdownKind> {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a request in between is not lost
        notified.as_mut().enable();

        if let Some(kind) = self.requested() {
            return Some(kind);
        }

        tokio::select! {
            _ = &mut notified => self.requested(),
            _ = tokio::time::sleep(timeout) => None,
        }
    }

    /// Resolves once a user interrupt has been requested.
    pub async fn interrupted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.requested() == Some(ShutdownKind::Interrupt) {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_wait_times_out() {
        let signal = ShutdownSignal::new();
        assert_eq!(signal.wait(Duration::from_millis(10)).await, None);
        assert!(!signal.is_requested());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_requested() {
        let signal = ShutdownSignal::new();
        signal.request(ShutdownKind::Terminate);

        let start = Instant::now();
        let kind = signal.wait(Duration::from_secs(3600)).await;
        assert_eq!(kind, Some(ShutdownKind::Terminate));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_request_wakes_waiter() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait(Duration::from_secs(3600)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.request(ShutdownKind::Interrupt);

        let kind = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should wake up")
            .unwrap();
        assert_eq!(kind, Some(ShutdownKind::Interrupt));
    }

    #[tokio::test]
    async fn test_interrupt_overrides_terminate() {
        let signal = ShutdownSignal::new();
        signal.request(ShutdownKind::Terminate);
        signal.request(ShutdownKind::Interrupt);
        assert_eq!(signal.requested(), Some(ShutdownKind::Interrupt));

        signal.request(ShutdownKind::Terminate);
        assert_eq!(signal.requested(), Some(ShutdownKind::Interrupt));
    }

    #[tokio::test]
    async fn test_interrupted_ignores_terminate() {
        let signal = ShutdownSignal::new();
        signal.request(ShutdownKind::Terminate);
        let res = tokio::time::timeout(Duration::from_millis(50), signal.interrupted()).await;
        assert!(res.is_err());
    }
}
