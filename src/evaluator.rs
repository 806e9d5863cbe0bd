//! Threshold evaluation over the most recent readings
//!
//! ## Evaluation pass
//!
//! ```text
//! thresholds ─┐
//!             ├─► latest reading per module ─► value >= critical? ─► critical alert
//! readings ───┘   (from the newest N rows)     value >= high?     ─► warning alert
//!                                              otherwise          ─► nothing
//! ```
//!
//! A (variable, module) pair that raised an alert less than `debounce` ago
//! is skipped. All alerts of one pass are persisted in a single batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, instrument};

use crate::config::AlertingConfig;
use crate::storage::{
    AlertPriority, AlertRecord, NewAlert, StorageBackend, StorageResult, Threshold,
};
use crate::{Reading, Variable};

#[derive(Debug, Clone, Copy)]
pub struct AlertPolicy {
    /// Minimum age of the previous alert for the same (variable, module)
    pub debounce: TimeDelta,

    /// Number of most recent readings scanned per pass
    pub recent_window: usize,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::from(&AlertingConfig::default())
    }
}

impl From<&AlertingConfig> for AlertPolicy {
    fn from(config: &AlertingConfig) -> Self {
        Self {
            debounce: TimeDelta::seconds(config.debounce_secs as i64),
            recent_window: config.recent_window.max(1),
        }
    }
}

/// Severity of a value against a threshold, with the bound it crossed
///
/// Critical wins over warning when both bounds are exceeded.
pub fn classify(value: f64, threshold: &Threshold) -> Option<(AlertPriority, f64)> {
    if value >= threshold.critical {
        Some((AlertPriority::Critical, threshold.critical))
    } else if value >= threshold.high {
        Some((AlertPriority::Warning, threshold.high))
    } else {
        None
    }
}

/// Keep the first (newest) reading of every module, preserving order
pub fn latest_per_module(readings: Vec<Reading>) -> Vec<Reading> {
    let mut seen = HashSet::new();
    readings
        .into_iter()
        .filter(|reading| seen.insert(reading.module_id.clone()))
        .collect()
}

fn build_alert(
    reading: &Reading,
    variable: Variable,
    value: f64,
    priority: AlertPriority,
    bound: f64,
    now: DateTime<Utc>,
) -> NewAlert {
    let level = match priority {
        AlertPriority::Critical => "CRITICAL",
        AlertPriority::Warning => "HIGH",
    };
    let unit = variable.unit();

    NewAlert {
        variable,
        priority,
        message: format!(
            "{} in {} exceeded the {level} threshold: {value:.2} {unit} (threshold {bound:.2} {unit})",
            variable.display_name(),
            reading.module_id,
        ),
        module_id: reading.module_id.clone(),
        observed_value: value,
        threshold_value: bound,
        sensor_label: format!("{} Sensor #{}", variable.display_name(), reading.module_id),
        created_at: now,
    }
}

/// Raises alerts for readings that cross their thresholds
#[derive(Clone)]
pub struct AlertEvaluator {
    storage: Arc<dyn StorageBackend>,
    policy: AlertPolicy,
}

impl AlertEvaluator {
    pub fn new(storage: Arc<dyn StorageBackend>, policy: AlertPolicy) -> Self {
        Self { storage, policy }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Run one evaluation pass and return the alerts it created
    ///
    /// Any storage failure aborts the pass without writing partial results.
    #[instrument(skip(self))]
    pub async fn evaluate(&self, now: DateTime<Utc>) -> StorageResult<Vec<AlertRecord>> {
        let thresholds: HashMap<Variable, Threshold> = self
            .storage
            .thresholds()
            .await?
            .into_iter()
            .map(|threshold| (threshold.variable, threshold))
            .collect();

        if thresholds.is_empty() {
            debug!("no thresholds configured, skipping evaluation");
            return Ok(Vec::new());
        }

        let readings = self
            .storage
            .recent_readings(self.policy.recent_window)
            .await?;

        let mut pending = Vec::new();

        for reading in latest_per_module(readings) {
            for (variable, value) in reading.values() {
                let Some(threshold) = thresholds.get(&variable) else {
                    continue;
                };
                let Some((priority, bound)) = classify(value, threshold) else {
                    continue;
                };

                let previous = self
                    .storage
                    .latest_alert(variable, &reading.module_id)
                    .await?;
                let recent = previous.filter(|p| now - p.created_at < self.policy.debounce);
                if let Some(previous) = recent {
                    debug!(
                        "{}/{variable}: alert {} raised {}s ago, debounced",
                        reading.module_id,
                        previous.id,
                        (now - previous.created_at).num_seconds()
                    );
                    continue;
                }

                pending.push(build_alert(&reading, variable, value, priority, bound, now));
            }
        }

        let created = self.storage.insert_alerts(pending).await?;
        for alert in &created {
            info!(
                "{} alert {} for {}: {}",
                alert.priority, alert.id, alert.module_id, alert.message
            );
        }

        Ok(created)
    }
}
