//! Actor-based ingestion pipeline
//!
//! Each actor runs as an independent tokio task and is driven through a
//! cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!   aviary-subscriber                               aviary-hub
//!
//!   MqttSubscriber                                  POST /readings
//!        │ InboundMessage (bounded mpsc)                 │ insert_reading
//!        ▼                                               ▼
//!   IngestActor (owns Assembler)                    StorageBackend
//!        │ Reading (try_send, sharded by module)         │ notify_persisted
//!        ▼                                               ▼
//!   ForwarderPool workers ──── HTTP POST ──────►    EvaluatorActor ──► alerts
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Data**: Bounded channels between pipeline stages
//! 3. **Request/Response**: oneshot channels for stats and acknowledgements

pub mod evaluator;
pub mod forwarder;
pub mod ingest;
pub mod messages;
pub mod subscriber;
