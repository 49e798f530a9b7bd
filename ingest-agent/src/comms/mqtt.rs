//! MQTT listener built on `rumqttc`.
//!
//! The rumqttc event loop reconnects on the next `poll()` after a failure,
//! so the listener only has to wait `reconnect_delay` between attempts and
//! subscribe again on every `ConnAck`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, SubscribeReasonCode};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::comms::{BusEvent, BusMessage, LinkState, Listener, ReceiptClock};
use crate::config::model::BusConfig;
use crate::greengrid_log;

/// rumqttc rejects keep-alives shorter than this.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Capacity of rumqttc's request queue (subscribe/disconnect only).
const REQUEST_CAPACITY: usize = 10;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MQTT client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection failed: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("broker refused subscription to '{topic}' ({codes:?})")]
    SubscriptionRefused { topic: String, codes: Vec<SubscribeReasonCode> },
}

pub fn qos_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

pub struct MqttListener {
    cfg: BusConfig,
}

impl MqttListener {
    pub fn new(cfg: BusConfig) -> Self {
        Self { cfg }
    }

    pub fn options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(&self.cfg.client_id, &self.cfg.host, self.cfg.port);
        opts.set_keep_alive(self.cfg.keep_alive.max(MIN_KEEP_ALIVE));
        opts
    }

    /// Forward `ev` unless shutdown fires first. `false` means stop.
    async fn forward(tx: &mpsc::Sender<BusEvent>, ev: BusEvent, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            sent = tx.send(ev) => sent.is_ok(),
        }
    }
}

#[async_trait]
impl Listener for MqttListener {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn capacity(&self) -> usize {
        self.cfg.queue_capacity
    }

    async fn ingest(self: Arc<Self>, tx: mpsc::Sender<BusEvent>, shutdown: CancellationToken) {
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        let qos = qos_level(self.cfg.qos);
        let mut link = LinkState::Disconnected;
        let mut clock = ReceiptClock::default();

        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = eventloop.poll() => polled,
            };

            let ev = match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    greengrid_log!(log::Level::Info, "bus", "Connected to mqtt://{}:{}", self.cfg.host, self.cfg.port);
                    // subscriptions do not survive a reconnect with a clean session
                    if let Err(e) = client.try_subscribe(self.cfg.topic.as_str(), qos) {
                        greengrid_log!(log::Level::Error, "bus", "{}", TransportError::from(e));
                    }
                    continue;
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack.return_codes.iter().any(|c| matches!(c, SubscribeReasonCode::Success(_))) {
                        BusEvent::Subscribed { topic: self.cfg.topic.clone() }
                    } else {
                        let err = TransportError::SubscriptionRefused {
                            topic: self.cfg.topic.clone(),
                            codes: ack.return_codes,
                        };
                        greengrid_log!(log::Level::Error, "bus", "{}", err);
                        continue;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(p))) => BusEvent::Message(BusMessage {
                    topic:       p.topic.clone(),
                    payload:     p.payload.to_vec(),
                    received_at: clock.stamp(),
                }),
                Ok(_) => continue,
                Err(e) => {
                    let err = TransportError::from(e);
                    greengrid_log!(
                        log::Level::Warn,
                        "bus",
                        "{}; retrying in {:?}",
                        err,
                        self.cfg.reconnect_delay
                    );
                    if link == LinkState::Subscribed {
                        let ev = BusEvent::Disconnected { reason: err.to_string() };
                        link = LinkState::Disconnected;
                        if !Self::forward(&tx, ev, &shutdown).await {
                            break;
                        }
                    }
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.cfg.reconnect_delay) => continue,
                    }
                }
            };

            link = link.on_event(&ev);
            if !Self::forward(&tx, ev, &shutdown).await {
                break;
            }
        }

        let _ = client.try_disconnect();
    }
}
