//! Integration tests for SQLite persistence
//!
//! These tests verify that:
//! - Readings, thresholds and alerts survive reopening the database
//! - Alert ids keep increasing across restarts
//! - The evaluator works against the SQLite backend

use std::sync::Arc;

use aviary_monitoring::{
    Variable,
    config::StorageConfig,
    evaluator::{AlertEvaluator, AlertPolicy},
    storage::{
        self, AlertFilter, AlertPriority, AlertStatus, ReadingQuery, StorageBackend, Threshold,
        sqlite::SqliteBackend,
    },
};
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::reading;

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("aviary.db");

    let now = Utc::now();
    let stored = reading(
        "M2",
        now,
        &[(Variable::Temperature, 31.5), (Variable::Ammonia, 42.0)],
    );

    {
        let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        backend.insert_reading(&stored).await.unwrap();
        backend
            .upsert_thresholds(Threshold::defaults())
            .await
            .unwrap();

        let evaluator = AlertEvaluator::new(backend.clone(), AlertPolicy::default());
        let created = evaluator.evaluate(now).await.unwrap();
        assert_eq!(created.len(), 2);

        backend.close().await.unwrap();
    }

    let backend = SqliteBackend::new(&db_path).await.unwrap();

    let latest = backend.latest_reading("M2").await.unwrap().unwrap();
    assert_eq!(latest.id, stored.id);
    assert_eq!(latest.ammonia, Some(42.0));
    assert_eq!(latest.co, None);

    assert_eq!(backend.thresholds().await.unwrap().len(), 5);

    let alerts = backend.query_alerts(AlertFilter::default()).await.unwrap();
    assert_eq!(alerts.len(), 2);
    let critical = alerts
        .iter()
        .find(|alert| alert.priority == AlertPriority::Critical)
        .unwrap();
    assert_eq!(critical.variable, Variable::Ammonia);
    assert_eq!(critical.sensor_label, "Ammonia Sensor #M2");
}

#[tokio::test]
async fn test_alert_ids_increase_after_delete() {
    let temp_dir = tempdir().unwrap();
    let backend = Arc::new(
        SqliteBackend::new(temp_dir.path().join("ids.db"))
            .await
            .unwrap(),
    );
    backend
        .upsert_thresholds(Threshold::defaults())
        .await
        .unwrap();

    let evaluator = AlertEvaluator::new(backend.clone(), AlertPolicy::default());
    let now = Utc::now();

    backend
        .insert_reading(&reading("M1", now, &[(Variable::Co, 31.0)]))
        .await
        .unwrap();
    let first = evaluator.evaluate(now).await.unwrap();
    assert_eq!(first.len(), 1);

    assert_eq!(backend.delete_alerts().await.unwrap(), 1);

    // nothing left to debounce against
    let second = evaluator.evaluate(now).await.unwrap();
    assert_eq!(second.len(), 1);
    assert!(second[0].id > first[0].id);
}

#[tokio::test]
async fn test_alert_lifecycle_through_open() {
    let temp_dir = tempdir().unwrap();
    let backend = storage::open(&StorageConfig::Sqlite {
        path: temp_dir.path().join("open.db"),
    })
    .await
    .unwrap();

    backend
        .upsert_thresholds(vec![Threshold::new(Variable::Humidity, 60.0, 75.0, 85.0)])
        .await
        .unwrap();

    let now = Utc::now();
    backend
        .insert_reading(&reading("M7", now, &[(Variable::Humidity, 80.0)]))
        .await
        .unwrap();

    let created = AlertEvaluator::new(backend.clone(), AlertPolicy::default())
        .evaluate(now)
        .await
        .unwrap();
    assert_eq!(created[0].priority, AlertPriority::Warning);

    let resolved_at = now + Duration::minutes(5);
    let resolved = backend
        .update_alert_status(created[0].id, AlertStatus::Resolved, resolved_at)
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert_eq!(
        resolved.resolved_at.map(|t| t.timestamp_millis()),
        Some(resolved_at.timestamp_millis())
    );

    let stats = backend.alert_stats().await.unwrap();
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.active_warning, 0);

    let history = backend
        .query_readings(ReadingQuery {
            module_id: Some("M7".to_string()),
            start: now - Duration::hours(1),
            end: now + Duration::hours(1),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    backend.close().await.unwrap();
}
