//! Request and response bodies of the hub API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Reading;
use crate::storage::{AlertPriority, AlertRecord, AlertStatus};

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: String,
}

/// Acknowledgement for POST /api/v1/readings
///
/// The subscriber only checks the status code, the body is logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub id: Uuid,
    pub module_id: String,
    pub status: String,
}

/// Query parameters for GET /api/v1/readings/latest
#[derive(Debug, Deserialize)]
pub struct LatestReadingQuery {
    pub module: String,
}

/// Query parameters for the historical reading range
#[derive(Debug, Deserialize)]
pub struct ReadingRangeQuery {
    /// Module filter (all modules if absent)
    pub module: Option<String>,

    /// Start time (RFC 3339, default: 24 hours before `end`)
    pub start: Option<DateTime<Utc>>,

    /// End time (RFC 3339, default: now)
    pub end: Option<DateTime<Utc>>,

    /// Max results (default: 1000)
    pub limit: Option<usize>,
}

/// Response for GET /api/v1/readings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub start: String,
    pub end: String,
    pub count: usize,
    pub readings: Vec<Reading>,
}

/// Query parameters for GET /api/v1/alerts
#[derive(Debug, Default, Deserialize)]
pub struct AlertListQuery {
    pub priority: Option<AlertPriority>,
    pub status: Option<AlertStatus>,
    pub module: Option<String>,

    /// Max results (default: 100)
    pub limit: Option<usize>,
}

/// Response for GET /api/v1/alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub count: usize,
    pub alerts: Vec<AlertRecord>,
}

/// Body of PUT /api/v1/alerts/:id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStatusUpdate {
    pub status: AlertStatus,
}

/// Response for the bulk alert operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedResponse {
    pub affected: usize,
}

/// Response for POST /api/v1/alerts/check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub created: usize,
    pub alerts: Vec<AlertRecord>,
}

/// Response for POST /api/v1/thresholds/defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedResponse {
    pub message: String,

    /// `created` when defaults were written, `none` when thresholds existed
    pub action: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}
