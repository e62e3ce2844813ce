//! The polling worker loop.
//!
//! One job at a time: claim, process to a terminal state, claim again.
//! Horizontal scaling is more worker processes against the same store, not
//! in-process parallelism. A shutdown request is only observed between jobs
//! and during idle sleeps, so the in-flight job always finishes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use montage_queue::JobStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::orchestrator::RenderOrchestrator;

/// Recorded on jobs orphaned by a crashed worker.
pub const STALE_JOB_MESSAGE: &str =
    "Processing timed out. The worker may have crashed. Please try again.";

/// Back-off after a failed claim attempt.
const CLAIM_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A long-running render worker.
pub struct Worker {
    store: Arc<dyn JobStore>,
    orchestrator: RenderOrchestrator,
    config: WorkerConfig,
    shutdown: watch::Sender<bool>,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        orchestrator: RenderOrchestrator,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            orchestrator,
            config,
            shutdown,
        }
    }

    /// Request a graceful stop; the in-flight job finishes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Trap SIGINT/SIGTERM into a graceful shutdown request.
    pub fn install_signal_handlers(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_termination_signal().await;
            info!("Shutdown signal received, finishing in-flight job");
            let _ = shutdown.send(true);
        });
    }

    /// Start the env-gated stale-job sweeper, if enabled.
    pub fn spawn_stale_sweeper(&self) -> Option<JoinHandle<()>> {
        if !self.config.stale_sweep_enabled {
            info!("Stale job sweep is disabled");
            return None;
        }

        let store = Arc::clone(&self.store);
        let interval = self.config.sweep_interval;
        let older_than = self.config.stale_after;

        Some(tokio::spawn(async move {
            info!("Starting stale job sweeper (interval: {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match store.fail_stale(older_than, STALE_JOB_MESSAGE).await {
                    Ok(0) => {}
                    Ok(swept) => warn!(swept, "Marked stale processing jobs as failed"),
                    Err(e) => error!("Stale sweep error: {}", e),
                }
            }
        }))
    }

    /// Run the polling loop until a shutdown request.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            poll_interval = ?self.config.poll_interval,
            "Worker started, polling for jobs"
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.store.claim_next().await {
                Ok(Some(job)) => {
                    // Synchronous to completion; shutdown is not observed here.
                    self.orchestrator.process(job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
                Err(e) => {
                    error!("Failed to claim next job: {}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(CLAIM_ERROR_BACKOFF) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
            }
        }

        info!("Worker stopped");
        Ok(())
    }
}

async fn wait_for_termination_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
