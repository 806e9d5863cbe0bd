//! Rows for thresholds and alerts
//!
//! Readings are stored as [`crate::Reading`] directly. Alerts and thresholds
//! get their own types here because the store assigns alert ids and the API
//! filters on priority and status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Variable;

/// Alert bounds for one variable
///
/// `medium` is informational only, alerts are raised on `high` and `critical`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub variable: Variable,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Threshold {
    pub fn new(variable: Variable, medium: f64, high: f64, critical: f64) -> Self {
        Self {
            variable,
            medium,
            high,
            critical,
        }
    }

    /// Factory defaults for a poultry house
    pub fn defaults() -> Vec<Threshold> {
        vec![
            Threshold::new(Variable::Temperature, 25.0, 30.0, 35.0),
            Threshold::new(Variable::Humidity, 60.0, 75.0, 85.0),
            Threshold::new(Variable::Ammonia, 20.0, 30.0, 40.0),
            Threshold::new(Variable::Co2, 1000.0, 1500.0, 2000.0),
            Threshold::new(Variable::Co, 10.0, 20.0, 30.0),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPriority::Critical => "critical",
            AlertPriority::Warning => "warning",
        }
    }
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(AlertPriority::Critical),
            "warning" => Ok(AlertPriority::Warning),
            other => Err(format!("unknown alert priority: {other}")),
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

/// An alert produced by the evaluator, before the store assigns an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub variable: Variable,
    pub priority: AlertPriority,
    pub message: String,
    pub module_id: String,
    pub observed_value: f64,
    pub threshold_value: f64,
    pub sensor_label: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub variable: Variable,
    pub priority: AlertPriority,
    pub message: String,
    pub module_id: String,
    pub observed_value: f64,
    pub threshold_value: f64,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub sensor_label: String,
}

impl AlertRecord {
    /// New alerts always start out active
    pub fn from_new(id: i64, alert: NewAlert) -> Self {
        Self {
            id,
            variable: alert.variable,
            priority: alert.priority,
            message: alert.message,
            module_id: alert.module_id,
            observed_value: alert.observed_value,
            threshold_value: alert.threshold_value,
            status: AlertStatus::Active,
            created_at: alert.created_at,
            resolved_at: None,
            sensor_label: alert.sensor_label,
        }
    }
}

/// Filter for alert listings, results are always newest first
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub priority: Option<AlertPriority>,
    pub status: Option<AlertStatus>,
    pub module_id: Option<String>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &AlertRecord) -> bool {
        self.priority.is_none_or(|p| p == alert.priority)
            && self.status.is_none_or(|s| s == alert.status)
            && self
                .module_id
                .as_deref()
                .is_none_or(|m| m == alert.module_id)
    }
}

/// Time range query for historical readings
#[derive(Debug, Clone)]
pub struct ReadingQuery {
    /// Restrict to one module (all modules if `None`)
    pub module_id: Option<String>,

    /// Start of time range (inclusive)
    pub start: DateTime<Utc>,

    /// End of time range (inclusive)
    pub end: DateTime<Utc>,

    /// Maximum number of results to return
    pub limit: Option<usize>,
}

impl ReadingQuery {
    pub fn matches(&self, reading: &crate::Reading) -> bool {
        reading.captured_at >= self.start
            && reading.captured_at <= self.end
            && self
                .module_id
                .as_deref()
                .is_none_or(|m| m == reading.module_id)
    }
}

/// Dashboard counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub active_critical: u64,
    pub active_warning: u64,
    pub resolved: u64,
}
