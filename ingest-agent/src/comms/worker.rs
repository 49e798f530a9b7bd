//! Bridge from bus delivery to persistence.
//!
//! For every delivered message the worker stores the payload untouched under
//! the receipt time its listener stamped, and lets the retention policy trim
//! the table, all in one SQLite transaction. It awaits each store call before taking the next
//! message, so delivery order is insertion order and ids grow monotonically.
//!
//! A `StorageError` drops that one message: it is logged and counted, and
//! the worker moves on. Redelivery is the bus's concern.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use metrics::{counter, gauge};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::comms::{BusEvent, BusMessage, LinkState};
use crate::db::{with_store, IngestOutcome, RetentionPolicy, StorageError, Store};
use crate::greengrid_log;

/// Running totals, shared with whoever wants to report them.
#[derive(Debug, Default)]
pub struct IngestStats {
    stored:  AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

impl IngestStats {
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

pub struct IngestionWorker {
    store:    Arc<Store>,
    policy:   RetentionPolicy,
    state_tx: watch::Sender<LinkState>,
    stats:    Arc<IngestStats>,
}

impl IngestionWorker {
    pub fn new(store: Arc<Store>, policy: RetentionPolicy) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        Self {
            store,
            policy,
            state_tx,
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state_tx.borrow()
    }

    /// Follow the link state from elsewhere (the health endpoint).
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Drain `rx` until the listener hangs up or `shutdown` fires. Shutdown is
    /// only observed between messages; an insert in flight always finishes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<BusEvent>, shutdown: CancellationToken) {
        greengrid_log!(
            log::Level::Info,
            "ingest",
            "Ingestion worker started (capacity={}, check_every={})",
            self.policy.capacity(),
            self.policy.check_every()
        );
        loop {
            let ev = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                ev = rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            self.handle_event(ev).await;
        }
        self.set_state(LinkState::Disconnected);
        greengrid_log!(
            log::Level::Info,
            "ingest",
            "Ingestion worker stopped: stored={} dropped={} evicted={}",
            self.stats.stored(),
            self.stats.dropped(),
            self.stats.evicted()
        );
    }

    /// Apply one bus event: link transitions update the state, messages are
    /// persisted.
    pub async fn handle_event(&mut self, ev: BusEvent) {
        match ev {
            BusEvent::Subscribed { ref topic } => {
                greengrid_log!(log::Level::Info, "bus", "Subscribed to {}", topic);
                self.set_state(self.state().on_event(&ev));
            }
            BusEvent::Disconnected { ref reason } => {
                greengrid_log!(log::Level::Warn, "bus", "Disconnected: {}", reason);
                self.set_state(self.state().on_event(&ev));
            }
            BusEvent::Message(msg) => {
                let topic = msg.topic.clone();
                let bytes = msg.payload.len();
                match self.persist(msg).await {
                    Ok(out) => {
                        log::debug!("Stored reading id={} topic={} bytes={}", out.id, topic, bytes);
                        if out.evicted > 0 {
                            log::debug!("Evicted {} oldest reading(s)", out.evicted);
                        }
                    }
                    Err(e) => {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        counter!("greengrid_readings_dropped_total").increment(1);
                        if e.is_busy() {
                            log::warn!("Dropped message on {} ({} bytes): database busy: {}", topic, bytes, e);
                        } else {
                            log::error!("Dropped message on {} ({} bytes): {}", topic, bytes, e);
                        }
                    }
                }
            }
        }
    }

    /// Store `msg` under the receipt time its listener stamped.
    pub async fn persist(&mut self, msg: BusMessage) -> Result<IngestOutcome, StorageError> {
        let policy = self.policy;
        let BusMessage { topic, payload, received_at } = msg;
        let out = with_store(&self.store, move |s| s.ingest(&topic, received_at, &payload, &policy)).await?;

        self.stats.stored.fetch_add(1, Ordering::Relaxed);
        self.stats.evicted.fetch_add(out.evicted, Ordering::Relaxed);
        counter!("greengrid_readings_stored_total").increment(1);
        counter!("greengrid_readings_evicted_total").increment(out.evicted);
        Ok(out)
    }

    fn set_state(&self, next: LinkState) {
        gauge!("greengrid_bus_subscribed").set(if next == LinkState::Subscribed { 1.0 } else { 0.0 });
        self.state_tx.send_replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::DatabaseConfig;

    fn worker(capacity: u64) -> (tempfile::TempDir, IngestionWorker) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("w.db"), &DatabaseConfig::default()).unwrap();
        (dir, IngestionWorker::new(Arc::new(store), RetentionPolicy::new(capacity)))
    }

    #[tokio::test]
    async fn link_events_move_the_state_machine() {
        let (_dir, mut w) = worker(10);
        let watcher = w.link_state();
        assert_eq!(w.state(), LinkState::Disconnected);

        w.handle_event(BusEvent::Subscribed { topic: "t".into() }).await;
        assert_eq!(*watcher.borrow(), LinkState::Subscribed);

        w.handle_event(BusEvent::Disconnected { reason: "broker gone".into() }).await;
        assert_eq!(w.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn stores_the_listener_receipt_time() {
        let (_dir, mut w) = worker(10);
        // a message that sat in the queue keeps the time it was received
        let queued = BusMessage { received_at: 1_700_000_000_000, ..BusMessage::new("t", "{}") };
        let out = w.persist(queued).await.unwrap();
        let stored = w.store.latest().unwrap().unwrap();
        assert_eq!(stored.id, out.id);
        assert_eq!(stored.received_at, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn malformed_payloads_are_stored_verbatim() {
        let (_dir, mut w) = worker(10);
        w.handle_event(BusEvent::Message(BusMessage::new("t", "not json {"))).await;
        assert_eq!(w.stats().stored(), 1);
        assert_eq!(w.store.latest().unwrap().unwrap().payload, b"not json {".to_vec());
    }
}
