//! Graceful Shutdown Handling
//!
//! Waits for SIGTERM, SIGINT or Ctrl+C, tells every component to stop and
//! closes all backend sessions before the process exits.

use crate::connection::ConnectionSupervisor;
use crate::Result;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_complete: Notify,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            shutdown_complete: Notify::new(),
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast the shutdown signal to every subscriber
    pub fn trigger(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("No components listening for shutdown signal");
        }
    }

    /// Start listening for shutdown signals (SIGTERM, SIGINT)
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Stop polling and close every backend session
    pub async fn shutdown_supervisor(&self, supervisor: &ConnectionSupervisor) -> Result<()> {
        info!(timeout = ?self.timeout, "Closing backend sessions");
        let start_time = Instant::now();

        // Every close is bounded, so the timeout only reports slowness
        let closing = supervisor.shutdown();
        tokio::pin!(closing);
        if tokio::time::timeout(self.timeout, &mut closing).await.is_err() {
            warn!(
                "Sessions still closing after {:?}, waiting for the rest",
                start_time.elapsed()
            );
            closing.await;
        }
        info!("Backend sessions closed in {:?}", start_time.elapsed());

        self.shutdown_complete.notify_waiters();
        Ok(())
    }

    /// Wait for shutdown completion with timeout
    pub async fn wait_for_completion(&self) -> Result<()> {
        tokio::time::timeout(
            self.timeout + Duration::from_secs(1),
            self.shutdown_complete.notified(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Shutdown completion timeout"))?;

        Ok(())
    }
}
