/*
    scheduler.rs - Periodic sync passes

    Runs `SyncService::sync_now` on a fixed interval until shutdown is
    signalled. The first pass runs immediately. Passes are blocking file
    I/O, so each one runs on the blocking pool and is awaited to completion
    before the next tick is considered.
*/

use crate::core_store::sync::report::SyncOutcome;
use crate::core_store::sync::service::SyncService;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Drives periodic sync passes for one replica
pub struct SyncScheduler {
    service: Arc<SyncService>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(service: Arc<SyncService>, interval: Duration) -> Self {
        SyncScheduler { service, interval }
    }

    /// Spawn the loop on the current runtime. The handle yields the number of passes attempted.
    pub fn spawn(self, shutdown: broadcast::Receiver<ShutdownSignal>) -> JoinHandle<u64> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            replica = %self.service.replica_id(),
            interval_ms = self.interval.as_millis() as u64,
            "Sync scheduler started"
        );

        let mut passes = 0u64;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    passes += 1;
                    let service = self.service.clone();
                    match tokio::task::spawn_blocking(move || service.sync_now()).await {
                        Ok(SyncOutcome::Completed(report)) => {
                            debug!(pass = passes, converged = report.is_noop(), "Scheduled pass completed");
                        }
                        Ok(SyncOutcome::Skipped { reason }) => {
                            debug!(pass = passes, %reason, "Scheduled pass skipped");
                        }
                        Ok(SyncOutcome::Failed { error }) => {
                            warn!(pass = passes, %error, "Scheduled pass failed");
                        }
                        Err(e) => {
                            error!(pass = passes, error = %e, "Sync task panicked");
                        }
                    }
                }
                received = shutdown.recv() => {
                    if ends_loop(&received) {
                        break;
                    }
                }
            }
        }

        passes
    }
}

/// A lagged receiver only missed older signals; the retained ones arrive next.
fn ends_loop(received: &Result<ShutdownSignal, RecvError>) -> bool {
    match received {
        Ok(signal) => {
            info!(?signal, "Sync scheduler stopping");
            true
        }
        Err(RecvError::Lagged(missed)) => {
            warn!(missed, "Shutdown receiver lagged, still running");
            false
        }
        Err(RecvError::Closed) => {
            warn!("Shutdown channel closed, stopping");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::model::{Record, ReplicaId, HISTORY};
    use crate::core_store::store::{MemoryStore, RecordStore};
    use crate::shutdown::ShutdownCoordinator;

    #[tokio::test]
    async fn test_scheduler_runs_until_shutdown() {
        let local = Arc::new(MemoryStore::new("local"));
        let shared = Arc::new(MemoryStore::new("shared"));
        let service = Arc::new(
            SyncService::new(ReplicaId::new("r1".to_string()), local.clone())
                .with_shared_store(shared.clone()),
        );
        service
            .create_record("history", Record::new().with("timestamp", "2024-06-01T08:00:00Z"))
            .unwrap();

        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        let handle = SyncScheduler::new(service.clone(), Duration::from_millis(20))
            .spawn(coordinator.subscribe());

        tokio::time::sleep(Duration::from_millis(70)).await;
        coordinator.shutdown().await;

        let passes = handle.await.unwrap();
        assert!(passes >= 1);
        assert_eq!(shared.load_collection(&HISTORY).len(), 1);
        assert!(service.last_outcome().unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_scheduler_stops_when_channel_closes() {
        let service = Arc::new(SyncService::new(
            ReplicaId::new("r1".to_string()),
            Arc::new(MemoryStore::new("local")),
        ));
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(1));
        let rx = coordinator.subscribe();
        let handle = SyncScheduler::new(service, Duration::from_secs(3600)).spawn(rx);

        drop(coordinator);
        let passes = handle.await.unwrap();
        // Only the immediate first tick can have run
        assert!(passes <= 1);
    }

    #[test]
    fn test_only_signals_and_close_end_the_loop() {
        assert!(ends_loop(&Ok(ShutdownSignal::Graceful)));
        assert!(ends_loop(&Err(RecvError::Closed)));
        assert!(!ends_loop(&Err(RecvError::Lagged(3))));
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_signal_after_lagging() {
        let service = Arc::new(SyncService::new(
            ReplicaId::new("r1".to_string()),
            Arc::new(MemoryStore::new("local")),
        ));
        let (tx, rx) = broadcast::channel(1);
        tx.send(ShutdownSignal::Graceful).unwrap();
        tx.send(ShutdownSignal::Graceful).unwrap();

        let passes = SyncScheduler::new(service, Duration::from_secs(3600)).spawn(rx).await.unwrap();
        assert!(passes <= 1);
        drop(tx);
    }
}
