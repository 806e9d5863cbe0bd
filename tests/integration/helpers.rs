//! Helper functions for integration tests
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use aviary_monitoring::{
    Reading, Variable,
    actors::{forwarder::ForwarderPool, ingest::IngestHandle, messages::InboundMessage},
    config::{AssemblerConfig, ForwarderConfig},
    forwarder::HttpForwarder,
};
use chrono::{DateTime, TimeZone, Utc};

/// Fixed instant so bucket boundaries are predictable
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn message(topic: &str, payload: &str, received_at: DateTime<Utc>) -> InboundMessage {
    InboundMessage {
        topic: topic.to_string(),
        payload: payload.as_bytes().to_vec(),
        received_at,
    }
}

pub fn reading(module_id: &str, captured_at: DateTime<Utc>, values: &[(Variable, f64)]) -> Reading {
    let mut reading = Reading::new(module_id, captured_at);
    for (variable, value) in values {
        reading.set(*variable, *value);
    }
    reading
}

pub fn forwarder_config(url: impl Into<String>) -> ForwarderConfig {
    ForwarderConfig {
        url: url.into(),
        timeout_secs: 2,
        workers: 2,
        queue_capacity: 32,
        drain_timeout_secs: 10,
    }
}

/// Ingest actor feeding an HTTP forwarder pool
pub fn spawn_pipeline(config: &ForwarderConfig) -> (ForwarderPool, IngestHandle) {
    let forwarder = HttpForwarder::new(config).unwrap();
    let pool = ForwarderPool::spawn(Arc::new(forwarder), config);
    let ingest = IngestHandle::spawn(&AssemblerConfig::default(), pool.handle(), 64);
    (pool, ingest)
}

/// Poll `check` every 20ms for up to two seconds
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
