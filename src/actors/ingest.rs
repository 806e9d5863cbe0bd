//! IngestActor - single consumer of broker messages
//!
//! ## Message Flow
//!
//! ```text
//! MqttSubscriber ──► InboundMessage ──► decode ──┬─ Json    → Reading ───────────────┐
//!                                                ├─ Scalar  → Assembler → Reading? ──┼─► ForwarderHandle
//!                                                └─ Ignored → logged                 │
//!                                                                  sweep after each scalar
//! ```
//!
//! The actor owns the [`Assembler`]. Every working-set mutation happens on
//! this task, so the assembler needs no lock.

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, trace};

use crate::Reading;
use crate::assembler::Assembler;
use crate::config::AssemblerConfig;
use crate::decoder::{Decoded, decode};

use super::forwarder::ForwarderHandle;
use super::messages::{InboundMessage, IngestCommand, IngestStats};

pub struct IngestActor {
    assembler: Assembler,
    forwarder: ForwarderHandle,

    /// Broker messages from the subscriber
    message_rx: mpsc::Receiver<InboundMessage>,

    command_rx: mpsc::Receiver<IngestCommand>,
    stats: IngestStats,
}

impl IngestActor {
    pub fn new(
        config: &AssemblerConfig,
        forwarder: ForwarderHandle,
        message_rx: mpsc::Receiver<InboundMessage>,
        command_rx: mpsc::Receiver<IngestCommand>,
    ) -> Self {
        Self {
            assembler: Assembler::new(config),
            forwarder,
            message_rx,
            command_rx,
            stats: IngestStats::default(),
        }
    }

    /// Run until a Shutdown command arrives or both channels are closed
    ///
    /// Queued messages are handled before commands.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting ingest actor");

        let mut shutdown_ack: Option<oneshot::Sender<()>> = None;

        loop {
            tokio::select! {
                biased;

                Some(message) = self.message_rx.recv() => {
                    self.handle_message(message);
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        IngestCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.snapshot());
                        }
                        IngestCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            shutdown_ack = Some(respond_to);
                            break;
                        }
                    }
                }

                else => {
                    debug!("all channels closed, shutting down");
                    break;
                }
            }
        }

        let discarded = self.assembler.clear();
        if discarded > 0 {
            info!("discarded {discarded} in-flight partial readings");
        }

        // release the forwarder handle before acknowledging
        drop(self);
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }

        debug!("ingest actor stopped");
    }

    fn handle_message(&mut self, message: InboundMessage) {
        self.stats.received += 1;
        trace!("message on {} ({} bytes)", message.topic, message.payload.len());

        match decode(&message.topic, &message.payload) {
            Decoded::Json(update) => {
                if update.values.is_empty() {
                    debug!("JSON on {} carries no known sensor keys", message.topic);
                }

                self.stats.json += 1;
                let reading = update.into_reading(message.received_at);
                self.dispatch(reading);
            }

            Decoded::Scalar(update) => {
                self.stats.scalar += 1;
                let completed = self.assembler.ingest_scalar(
                    &update.module_id,
                    update.variable,
                    update.value,
                    message.received_at,
                );

                if let Some(reading) = completed {
                    self.dispatch(reading);
                }

                self.assembler.sweep(message.received_at);
            }

            Decoded::Ignored(reason) => {
                self.stats.ignored += 1;
                debug!("ignoring message on {}: {reason}", message.topic);
            }
        }
    }

    fn dispatch(&mut self, reading: Reading) {
        debug!("reading {} for {} complete", reading.id, reading.module_id);
        if self.forwarder.submit(reading) {
            self.stats.dispatched += 1;
        }
    }

    fn snapshot(&self) -> IngestStats {
        IngestStats {
            evicted: self.assembler.evicted(),
            pending: self.assembler.pending(),
            ..self.stats.clone()
        }
    }
}

/// Handle for feeding and controlling the IngestActor
#[derive(Clone)]
pub struct IngestHandle {
    message_tx: mpsc::Sender<InboundMessage>,
    sender: mpsc::Sender<IngestCommand>,
}

impl IngestHandle {
    /// Spawn the ingest actor with a message channel of `capacity`
    pub fn spawn(config: &AssemblerConfig, forwarder: ForwarderHandle, capacity: usize) -> Self {
        let (message_tx, message_rx) = mpsc::channel(capacity.max(1));
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = IngestActor::new(config, forwarder, message_rx, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            message_tx,
            sender: cmd_tx,
        }
    }

    /// Sender for the subscriber side
    pub fn message_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.message_tx.clone()
    }

    /// Queue one broker message, waiting if the channel is full
    pub async fn submit(&self, message: InboundMessage) -> Result<()> {
        self.message_tx
            .send(message)
            .await
            .context("ingest actor stopped")
    }

    pub async fn stats(&self) -> Result<IngestStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(IngestCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive stats")
    }

    /// Stop the actor and wait until it released its forwarder handle
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(IngestCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("ingest actor stopped without acknowledging")
    }
}
