//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Data**: Broker messages and readings flow over their own bounded channels
//! 3. **Snapshots**: Stats are plain copies, never shared mutable state

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::storage::AlertRecord;

/// A publish received from the broker, before decoding
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,

    /// Wall-clock time the subscriber received the message
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// Commands that can be sent to the IngestActor
#[derive(Debug)]
pub enum IngestCommand {
    GetStats {
        respond_to: oneshot::Sender<IngestStats>,
    },

    /// Stop the actor
    ///
    /// In-flight partial readings are discarded. The acknowledgement is sent
    /// after the actor released its forwarder handle.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Counters of the ingest actor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Messages received from the subscriber
    pub received: u64,

    /// Messages decoded as batched JSON readings
    pub json: u64,

    /// Messages decoded as legacy scalar values
    pub scalar: u64,

    /// Messages dropped by the decoder (or JSON without known keys)
    pub ignored: u64,

    /// Readings handed to the forwarder pool
    pub dispatched: u64,

    /// Partial readings dropped for staleness
    pub evicted: u64,

    /// Partial readings currently in flight
    pub pending: usize,
}

/// Snapshot of the forwarder pool counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwarderStats {
    pub forwarded: u64,

    /// Readings dropped because the worker queue was full
    pub queue_full: u64,

    pub unreachable: u64,
    pub timeout: u64,
    pub rejected: u64,

    /// Queued readings discarded when shutdown ran out of time
    pub abandoned: u64,
}

impl ForwarderStats {
    /// Readings that were dropped for any reason
    pub fn dropped(&self) -> u64 {
        self.queue_full + self.unreachable + self.timeout + self.rejected + self.abandoned
    }
}

/// Commands that can be sent to the EvaluatorActor
#[derive(Debug)]
pub enum EvaluatorCommand {
    /// A reading was committed, run an evaluation pass
    ReadingPersisted { reading_id: Uuid },

    /// Run an evaluation pass and report the alerts it created
    EvaluateNow {
        respond_to: oneshot::Sender<anyhow::Result<Vec<AlertRecord>>>,
    },

    Shutdown,
}

/// Commands that can be sent to the MQTT subscriber
#[derive(Debug)]
pub enum SubscriberCommand {
    /// Disconnect from the broker and stop polling
    Shutdown { respond_to: oneshot::Sender<()> },
}
