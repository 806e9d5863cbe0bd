//! End-to-end tests: broker message to stored alert
//!
//! The ingest actor and forwarder pool post to a real hub over HTTP, the
//! hub persists the reading and the evaluator raises alerts.

use std::sync::Arc;

use aviary_monitoring::{
    Variable,
    actors::evaluator::EvaluatorHandle,
    api::{ApiState, spawn_api_server},
    config::ApiConfig,
    evaluator::{AlertEvaluator, AlertPolicy},
    storage::{AlertFilter, AlertPriority, StorageBackend, Threshold, memory::MemoryBackend},
};
use pretty_assertions::assert_eq;

use crate::helpers::{at, eventually, forwarder_config, message, spawn_pipeline};

async fn spawn_hub(storage: Arc<MemoryBackend>) -> String {
    let evaluator = EvaluatorHandle::spawn(AlertEvaluator::new(
        storage.clone(),
        AlertPolicy::default(),
    ));
    let config = ApiConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        enable_cors: false,
    };

    let addr = spawn_api_server(&config, ApiState::new(storage, evaluator))
        .await
        .unwrap();
    format!("http://{addr}/api/v1/readings")
}

#[tokio::test]
async fn test_json_message_raises_critical_ammonia_alert() {
    let storage = Arc::new(MemoryBackend::new());
    storage
        .upsert_thresholds(vec![Threshold::new(Variable::Ammonia, 20.0, 30.0, 40.0)])
        .await
        .unwrap();

    let url = spawn_hub(storage.clone()).await;
    let (pool, ingest) = spawn_pipeline(&forwarder_config(url));

    ingest
        .submit(message(
            "sensor/modulo2/data",
            r#"{"temp":31.5,"hum":58,"nh3":42}"#,
            at(0),
        ))
        .await
        .unwrap();

    ingest.shutdown().await.unwrap();
    let stats = pool.shutdown().await;
    assert_eq!(stats.forwarded, 1);

    let stored = storage.latest_reading("M2").await.unwrap().unwrap();
    assert_eq!(stored.ammonia, Some(42.0));
    assert_eq!(stored.co2, None);

    let raised = eventually(|| {
        let storage = storage.clone();
        async move {
            !storage
                .query_alerts(AlertFilter::default())
                .await
                .unwrap()
                .is_empty()
        }
    })
    .await;
    assert!(raised, "evaluation should run after the reading is stored");

    let alerts = storage.query_alerts(AlertFilter::default()).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].priority, AlertPriority::Critical);
    assert_eq!(alerts[0].variable, Variable::Ammonia);
    assert_eq!(alerts[0].module_id, "M2");
    assert_eq!(alerts[0].observed_value, 42.0);
    assert_eq!(alerts[0].threshold_value, 40.0);
}

#[tokio::test]
async fn test_legacy_scalars_stored_as_one_reading() {
    let storage = Arc::new(MemoryBackend::new());
    let url = spawn_hub(storage.clone()).await;
    let (pool, ingest) = spawn_pipeline(&forwarder_config(url));

    for (sensor, value) in [
        ("temperatura", "22.5"),
        ("humedad", "64"),
        ("co", "2"),
        ("co2", "800"),
        ("amoniaco", "12"),
    ] {
        ingest
            .submit(message(&format!("sensor/modulo8/{sensor}"), value, at(0)))
            .await
            .unwrap();
    }

    ingest.shutdown().await.unwrap();
    pool.shutdown().await;

    let readings = storage.recent_readings(10).await.unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].module_id, "M8");
    assert_eq!(readings[0].humidity, Some(64.0));
    assert_eq!(readings[0].ammonia, Some(12.0));
}
