//! Listener abstraction + the in-process channel listener.
//! -----------------------------------------------------------------------------
//! A **listener** owns one transport (MQTT, an in-process channel, …) and
//! turns whatever it receives into [`BusEvent`]s on a bounded queue that the
//! [`IngestionWorker`](crate::comms::IngestionWorker) drains.
//!
//! Reconnect and backoff are the listener's business. The worker only sees
//! `Subscribed` / `Message` / `Disconnected`, in delivery order.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use crossbeam::channel::{Receiver as CbReceiver, RecvTimeoutError};
use tokio::{sync::mpsc, task::{self, JoinHandle}};
use tokio_util::sync::CancellationToken;

use crate::comms::{BusEvent, BusMessage, ReceiptClock};

// ============================================================================
// 1 ▸ Listener trait – uniform way to spawn them
// ============================================================================

#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Display name for metrics / logs.
    fn name(&self) -> &'static str;

    /// Capacity of the queue between this listener and the worker.
    fn capacity(&self) -> usize { 1_024 }

    /// Pull from the external source and push `BusEvent`s into `tx` until
    /// the source ends, the worker goes away, or `shutdown` fires.
    async fn ingest(self: Arc<Self>, tx: mpsc::Sender<BusEvent>, shutdown: CancellationToken);

    /// Launch `ingest` on the runtime and hand back the worker's end of the
    /// queue.
    fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> (mpsc::Receiver<BusEvent>, JoinHandle<()>) {
        let name = self.name();
        let (tx, rx) = mpsc::channel::<BusEvent>(self.capacity());

        let handle = task::spawn(async move {
            log::info!("listener '{name}' started");
            self.ingest(tx, shutdown).await;
            log::info!("listener '{name}' exited");
        });
        (rx, handle)
    }
}

// ============================================================================
// 2 ▸ ChannelListener – in-process publishers
// ============================================================================

/// Feeds messages published on a crossbeam channel into the pipeline, for
/// embedders that produce telemetry in-process and for tests.
///
/// Reports `Subscribed` as soon as it starts and `Disconnected` once every
/// sender has been dropped.
pub struct ChannelListener {
    topic: String,
    rx:    CbReceiver<BusMessage>,
}

impl ChannelListener {
    pub fn new(topic: impl Into<String>, rx: CbReceiver<BusMessage>) -> Self {
        Self { topic: topic.into(), rx }
    }
}

#[async_trait]
impl Listener for ChannelListener {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn ingest(self: Arc<Self>, tx: mpsc::Sender<BusEvent>, shutdown: CancellationToken) {
        // crossbeam recv blocks, so the loop lives on the blocking pool
        let joined = task::spawn_blocking(move || {
            let mut clock = ReceiptClock::default();
            let subscribed = BusEvent::Subscribed { topic: self.topic.clone() };
            if tx.blocking_send(subscribed).is_err() {
                return;
            }
            loop {
                if shutdown.is_cancelled() {
                    return;
                }
                match self.rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(mut msg) => {
                        msg.received_at = clock.stamp();
                        // blocking_send() parks this thread only, never a tokio worker
                        if tx.blocking_send(BusEvent::Message(msg)).is_err() {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        let reason = "all publishers dropped".to_owned();
                        let _ = tx.blocking_send(BusEvent::Disconnected { reason });
                        return;
                    }
                }
            }
        })
        .await;

        if let Err(e) = joined {
            log::error!("channel listener task failed: {}", e);
        }
    }
}
