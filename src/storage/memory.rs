//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Running the hub without a database file
//!
//! All data is lost on restart.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AlertFilter, AlertPriority, AlertRecord, AlertStats, AlertStatus, NewAlert, ReadingQuery,
    Threshold,
};
use crate::{Reading, Variable};

#[derive(Default)]
struct Inner {
    /// Readings in insertion order
    readings: Vec<Reading>,
    reading_ids: HashSet<Uuid>,
    thresholds: BTreeMap<Variable, Threshold>,

    /// Alerts in insertion order
    alerts: Vec<AlertRecord>,

    /// Last assigned alert id, never reused
    last_alert_id: i64,
}

impl Inner {
    /// Readings sorted newest first (ties broken by insertion order)
    fn readings_newest_first(&self) -> impl Iterator<Item = &Reading> {
        let mut indices: Vec<usize> = (0..self.readings.len()).collect();
        indices.sort_by(|&a, &b| {
            self.readings[b]
                .captured_at
                .cmp(&self.readings[a].captured_at)
                .then(b.cmp(&a))
        });
        indices.into_iter().map(|i| &self.readings[i])
    }

    fn alerts_newest_first(&self) -> impl Iterator<Item = &AlertRecord> {
        let mut alerts: Vec<&AlertRecord> = self.alerts.iter().collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        alerts.into_iter()
    }
}

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn insert_reading(&self, reading: &Reading) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.reading_ids.insert(reading.id) {
            return Err(StorageError::Conflict(format!(
                "reading {} already stored",
                reading.id
            )));
        }

        inner.readings.push(reading.clone());
        debug!("in-memory backend: stored reading {}", reading.id);
        Ok(())
    }

    async fn recent_readings(&self, limit: usize) -> StorageResult<Vec<Reading>> {
        let inner = self.inner.read().await;
        Ok(inner.readings_newest_first().take(limit).cloned().collect())
    }

    async fn latest_reading(&self, module_id: &str) -> StorageResult<Option<Reading>> {
        let inner = self.inner.read().await;
        Ok(inner
            .readings_newest_first()
            .find(|reading| reading.module_id == module_id)
            .cloned())
    }

    async fn query_readings(&self, query: ReadingQuery) -> StorageResult<Vec<Reading>> {
        let inner = self.inner.read().await;
        let mut readings: Vec<Reading> = inner
            .readings
            .iter()
            .filter(|reading| query.matches(reading))
            .cloned()
            .collect();
        readings.sort_by_key(|reading| reading.captured_at);
        readings.truncate(query.limit.unwrap_or(usize::MAX));
        Ok(readings)
    }

    async fn thresholds(&self) -> StorageResult<Vec<Threshold>> {
        let inner = self.inner.read().await;
        Ok(inner.thresholds.values().copied().collect())
    }

    async fn upsert_thresholds(&self, thresholds: Vec<Threshold>) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        for threshold in thresholds {
            inner.thresholds.insert(threshold.variable, threshold);
        }
        Ok(())
    }

    async fn latest_alert(
        &self,
        variable: Variable,
        module_id: &str,
    ) -> StorageResult<Option<AlertRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts_newest_first()
            .find(|alert| alert.variable == variable && alert.module_id == module_id)
            .cloned())
    }

    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> StorageResult<Vec<AlertRecord>> {
        let mut inner = self.inner.write().await;
        let mut stored = Vec::with_capacity(alerts.len());

        for alert in alerts {
            inner.last_alert_id += 1;
            let record = AlertRecord::from_new(inner.last_alert_id, alert);
            inner.alerts.push(record.clone());
            stored.push(record);
        }

        Ok(stored)
    }

    async fn query_alerts(&self, filter: AlertFilter) -> StorageResult<Vec<AlertRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts_newest_first()
            .filter(|alert| filter.matches(alert))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update_alert_status(
        &self,
        id: i64,
        status: AlertStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<AlertRecord> {
        let mut inner = self.inner.write().await;
        let alert = inner
            .alerts
            .iter_mut()
            .find(|alert| alert.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("alert {id}")))?;

        alert.status = status;
        if status == AlertStatus::Resolved {
            alert.resolved_at = Some(at);
        }
        Ok(alert.clone())
    }

    async fn acknowledge_active_alerts(&self) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for alert in inner
            .alerts
            .iter_mut()
            .filter(|alert| alert.status == AlertStatus::Active)
        {
            alert.status = AlertStatus::Acknowledged;
            updated += 1;
        }
        Ok(updated)
    }

    async fn alert_stats(&self) -> StorageResult<AlertStats> {
        let inner = self.inner.read().await;
        let mut stats = AlertStats::default();
        for alert in &inner.alerts {
            match (alert.status, alert.priority) {
                (AlertStatus::Active, AlertPriority::Critical) => {
                    stats.active_critical += 1
                }
                (AlertStatus::Active, AlertPriority::Warning) => {
                    stats.active_warning += 1
                }
                (AlertStatus::Resolved, _) => stats.resolved += 1,
                (AlertStatus::Acknowledged, _) => {}
            }
        }
        Ok(stats)
    }

    async fn delete_alerts(&self) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;
        let deleted = inner.alerts.len();
        inner.alerts.clear();
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let inner = self.inner.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("readings".to_string(), inner.readings.len().to_string()),
                ("alerts".to_string(), inner.alerts.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
