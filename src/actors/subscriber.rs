//! MqttSubscriber - owns the broker connection
//!
//! ## Message Flow
//!
//! ```text
//! broker ──► EventLoop::poll ──┬─ ConnAck → (re)subscribe
//!                              ├─ Publish → try_send InboundMessage → IngestActor
//!                              │              └── channel full → dropped, counted
//!                              └─ error   → log, wait reconnect_delay, poll again
//!     ↑
//!     └─── Commands (Shutdown)
//! ```
//!
//! rumqttc reconnects on the next poll after an error. Subscriptions are not
//! persisted by the broker for clean sessions, so they are renewed on every
//! ConnAck. The poll loop never awaits the ingest channel, so keep-alive
//! pings go out even while ingest is backed up.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::MqttConfig;

use super::messages::{InboundMessage, SubscriberCommand};

/// Capacity of the request channel between client and event loop
const CLIENT_CAPACITY: usize = 16;

pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(true);
    options
}

/// Convert a broker publish into the ingest message
pub fn inbound(publish: &Publish) -> InboundMessage {
    InboundMessage {
        topic: publish.topic.clone(),
        payload: publish.payload.to_vec(),
        received_at: Utc::now(),
    }
}

/// Outcome of handing a publish to the ingest channel
#[derive(Debug, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    Full,
    Closed,
}

/// Queue a publish for the ingest actor without waiting
pub fn enqueue(message_tx: &mpsc::Sender<InboundMessage>, publish: &Publish) -> Enqueued {
    match message_tx.try_send(inbound(publish)) {
        Ok(()) => Enqueued::Queued,
        Err(TrySendError::Full(_)) => Enqueued::Full,
        Err(TrySendError::Closed(_)) => Enqueued::Closed,
    }
}

pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    reconnect_delay: Duration,
    message_tx: mpsc::Sender<InboundMessage>,
    command_rx: mpsc::Receiver<SubscriberCommand>,
    dropped: u64,
}

/// What the poll loop should do after handling an event
enum Next {
    Continue,
    Backoff,
    Stop,
}

impl MqttSubscriber {
    pub fn new(
        config: &MqttConfig,
        message_tx: mpsc::Sender<InboundMessage>,
        command_rx: mpsc::Receiver<SubscriberCommand>,
    ) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), CLIENT_CAPACITY);

        Self {
            client,
            eventloop,
            topic: config.topic.clone(),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            message_tx,
            command_rx,
            dropped: 0,
        }
    }

    /// Poll the broker until shut down
    ///
    /// Never exits on a broker error or a bad message.
    #[instrument(skip(self), fields(topic = %self.topic))]
    pub async fn run(mut self) {
        info!("starting MQTT subscriber");

        let mut shutdown_ack: Option<oneshot::Sender<()>> = None;

        loop {
            let next = tokio::select! {
                event = self.eventloop.poll() => self.handle_event(event),

                cmd = self.command_rx.recv() => match cmd {
                    Some(SubscriberCommand::Shutdown { respond_to }) => {
                        shutdown_ack = Some(respond_to);
                        Next::Stop
                    }
                    None => Next::Stop,
                },
            };

            match next {
                Next::Continue => {}
                Next::Stop => break,
                Next::Backoff => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        cmd = self.command_rx.recv() => {
                            if let Some(SubscriberCommand::Shutdown { respond_to }) = cmd {
                                shutdown_ack = Some(respond_to);
                            }
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.client.try_disconnect() {
            trace!("disconnect request not delivered: {e}");
        }

        info!("MQTT subscriber stopped, {} messages dropped on a full channel", self.dropped);
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    fn handle_event(&mut self, event: Result<Event, rumqttc::ConnectionError>) -> Next {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("connected to broker ({:?})", ack.code);
                // the request channel is drained by poll(), so never await here
                if let Err(e) = self.client.try_subscribe(&self.topic, QoS::AtMostOnce) {
                    error!("failed to subscribe to {}: {e}", self.topic);
                }
                Next::Continue
            }

            Ok(Event::Incoming(Packet::SubAck(_))) => {
                debug!("subscribed to {}", self.topic);
                Next::Continue
            }

            Ok(Event::Incoming(Packet::Publish(publish))) => {
                trace!("publish on {}", publish.topic);
                match enqueue(&self.message_tx, &publish) {
                    Enqueued::Queued => Next::Continue,
                    Enqueued::Full => {
                        self.dropped += 1;
                        warn!("ingest channel full, dropping message on {}", publish.topic);
                        Next::Continue
                    }
                    Enqueued::Closed => {
                        warn!("ingest actor gone, stopping subscriber");
                        Next::Stop
                    }
                }
            }

            Ok(_) => Next::Continue,

            Err(e) => {
                error!(
                    "broker connection error: {e}, retrying in {}s",
                    self.reconnect_delay.as_secs()
                );
                Next::Backoff
            }
        }
    }
}

/// Handle for stopping the subscriber
#[derive(Clone)]
pub struct SubscriberHandle {
    sender: mpsc::Sender<SubscriberCommand>,
}

impl SubscriberHandle {
    pub fn spawn(config: &MqttConfig, message_tx: mpsc::Sender<InboundMessage>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        let subscriber = MqttSubscriber::new(config, message_tx, cmd_rx);
        tokio::spawn(subscriber.run());

        Self { sender: cmd_tx }
    }

    /// Disconnect and wait for the poll loop to exit
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SubscriberCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("subscriber stopped without acknowledging")
    }
}
