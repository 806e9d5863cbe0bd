//! Delivery of completed readings to the ingestion endpoint
//!
//! Forwarding is best effort. Callers get a classified [`ForwardError`] but
//! are expected to log it and drop the reading: sensors report every few
//! seconds, so a lost sample is replaced soon enough.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{instrument, trace};

use crate::Reading;
use crate::config::ForwarderConfig;

/// Acknowledgement returned by the ingestion endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub status: u16,

    /// Parsed acknowledgement body (`Null` if the body was not JSON)
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForwardError {
    /// Connection refused, unknown host or the transport failed
    #[error("ingestion endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("no response from ingestion endpoint within {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a non-success status
    #[error("ingestion endpoint rejected reading (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl ForwardError {
    /// Short label for logs and counters
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Unreachable(_) => "unreachable",
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Rejected { .. } => "rejected",
        }
    }
}

/// Sink for completed readings
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, reading: &Reading) -> Result<Ack, ForwardError>;
}

/// Posts readings as JSON to the ingestion endpoint
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    /// HTTP client (reused across requests)
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(config: &ForwarderConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, error: reqwest::Error) -> ForwardError {
        if error.is_timeout() {
            ForwardError::Timeout(self.timeout)
        } else {
            ForwardError::Unreachable(error.to_string())
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    #[instrument(skip_all, fields(reading_id = %reading.id, module_id = %reading.module_id))]
    async fn forward(&self, reading: &Reading) -> Result<Ack, ForwardError> {
        trace!("posting reading to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(reading)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(ForwardError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = serde_json::from_str(&body).unwrap_or_else(|e| {
            trace!("acknowledgement body is not JSON: {e}");
            serde_json::Value::Null
        });

        Ok(Ack {
            status: status.as_u16(),
            body,
        })
    }
}
