//! Process-wide shutdown coordination.
//!
//! [`GracefulShutdown`] turns SIGINT/SIGTERM into a one-shot broadcast. The server awaits
//! [`GracefulShutdown::wait_for_shutdown_signal`] to stop accepting connections, and
//! background tasks (config watcher, metrics summary) hold a [`ShutdownToken`].
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use eyre::{Result, WrapErr};
use tokio::{signal, sync::broadcast};

/// Why the gateway is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / SIGTERM
    Signal,
    /// Requested from inside the process
    Requested,
    /// The shutdown channel went away
    Closed,
}

pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            shutdown_tx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    /// Start shutdown. Only the first call broadcasts; later calls are ignored.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::info!(?reason, "Shutdown initiated");
            // No receivers simply means nobody is waiting yet.
            let _ = self.shutdown_tx.send(reason);
        } else {
            tracing::debug!(?reason, "Shutdown already initiated, ignoring");
        }
    }

    /// Wait for SIGINT or SIGTERM, then trigger shutdown.
    pub async fn run_signal_handler(&self) -> Result<()> {
        #[cfg(unix)]
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to register SIGTERM handler")?;

        #[cfg(unix)]
        let terminate = sigterm.recv();
        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                tracing::info!("Received SIGINT, shutting down gracefully");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
            }
        }
        self.trigger_shutdown(ShutdownReason::Signal);
        Ok(())
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        self.shutdown_token().wait_for_shutdown().await
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.subscribe(),
            shutdown_initiated: self.shutdown_initiated.clone(),
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A cloneable handle for observing shutdown from background tasks.
pub struct ShutdownToken {
    receiver: broadcast::Receiver<ShutdownReason>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl Clone for ShutdownToken {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            shutdown_initiated: self.shutdown_initiated.clone(),
        }
    }
}

impl ShutdownToken {
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    /// Resolve once shutdown has been triggered, including before this call.
    pub async fn wait_for_shutdown(&mut self) -> ShutdownReason {
        if self.is_shutdown_initiated() {
            return match self.receiver.try_recv() {
                Ok(reason) => reason,
                Err(_) => ShutdownReason::Requested,
            };
        }
        match self.receiver.recv().await {
            Ok(reason) => reason,
            Err(_) => ShutdownReason::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_every_subscriber_once() {
        let shutdown = GracefulShutdown::new();
        let mut first = shutdown.subscribe();
        let mut second = shutdown.subscribe();

        shutdown.trigger_shutdown(ShutdownReason::Requested);
        shutdown.trigger_shutdown(ShutdownReason::Signal);

        assert!(shutdown.is_shutdown_initiated());
        assert_eq!(first.try_recv().unwrap(), ShutdownReason::Requested);
        assert_eq!(second.try_recv().unwrap(), ShutdownReason::Requested);
        assert!(first.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_token_wakes_waiting_task() {
        let shutdown = GracefulShutdown::new();
        let mut token = shutdown.shutdown_token();
        let waiter = tokio::spawn(async move { token.wait_for_shutdown().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger_shutdown(ShutdownReason::Signal);

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, ShutdownReason::Signal);
    }

    #[tokio::test]
    async fn test_token_created_after_trigger_resolves_immediately() {
        let shutdown = GracefulShutdown::new();
        shutdown.trigger_shutdown(ShutdownReason::Requested);
        let mut token = shutdown.shutdown_token();
        assert!(token.is_shutdown_initiated());
        assert_eq!(token.wait_for_shutdown().await, ShutdownReason::Requested);
    }
}
