use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use sessiongate_auth::{purge_cutoff, RefreshTokenRegistry};
use sessiongate_core::Clock;

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the worker to stop.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

/// Periodically removes expired entries from a refresh token registry.
///
/// Entries are kept for `leeway` past their expiry, matching the window in
/// which the verifier still accepts the token; this only bounds storage growth.
#[derive(Debug)]
pub struct PurgeWorker;

impl PurgeWorker {
    pub fn spawn(
        registry: Arc<dyn RefreshTokenRegistry>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        leeway: Duration,
    ) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        match registry.purge_expired(purge_cutoff(clock.now(), leeway)).await {
                            Ok(0) => {}
                            Ok(purged) => tracing::info!(purged, "purged expired refresh tokens"),
                            Err(err) => tracing::warn!(error = %err, "refresh token purge failed"),
                        }
                    }
                }
            }

            tracing::debug!("purge worker stopped");
        });

        WorkerHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }
}
