// src/db/maintenance.rs
//! Periodic WAL checkpoints.

use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::{store::Store, with_store};

/// Checkpoint the WAL every `period` until `shutdown` fires.
pub fn spawn_wal_maintenance(
    store: Arc<Store>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // first tick is immediate
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match with_store(&store, |s| s.checkpoint()).await {
                        Ok(()) => log::debug!("WAL checkpoint done"),
                        Err(e) => log::warn!("WAL checkpoint failed: {}", e),
                    }
                }
            }
        }
        log::debug!("WAL maintenance stopped");
    })
}
