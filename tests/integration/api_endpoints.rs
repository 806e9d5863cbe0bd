//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - The ingestion endpoint stores readings and rejects duplicates
//! - Alert listing, status changes and bulk operations behave correctly
//! - Threshold seeding only writes into an empty store
//! - Error handling is correct

use std::net::SocketAddr;
use std::sync::Arc;

use aviary_monitoring::{
    Variable,
    actors::evaluator::EvaluatorHandle,
    api::{ApiState, spawn_api_server},
    config::ApiConfig,
    evaluator::{AlertEvaluator, AlertPolicy},
    storage::{StorageBackend, Threshold, memory::MemoryBackend},
};
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use crate::helpers::{eventually, reading};

struct TestHub {
    addr: SocketAddr,
    storage: Arc<MemoryBackend>,
    client: reqwest::Client,
}

impl TestHub {
    fn url(&self, path: &str) -> String {
        format!("http://{}/api/v1{}", self.addr, path)
    }
}

async fn spawn_test_hub() -> TestHub {
    let storage = Arc::new(MemoryBackend::new());
    let evaluator = EvaluatorHandle::spawn(AlertEvaluator::new(
        storage.clone(),
        AlertPolicy::default(),
    ));

    let config = ApiConfig {
        bind: "127.0.0.1:0".parse().unwrap(), // Random port
        enable_cors: true,
    };
    let addr = spawn_api_server(&config, ApiState::new(storage.clone(), evaluator))
        .await
        .unwrap();

    TestHub {
        addr,
        storage,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let hub = spawn_test_hub().await;

    let response = hub.client.get(hub.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_ingest_stores_reading_and_rejects_duplicate() {
    let hub = spawn_test_hub().await;
    let body = reading("M1", Utc::now(), &[(Variable::Temperature, 24.0)]);

    let response = hub
        .client
        .post(hub.url("/readings"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let ack: Value = response.json().await.unwrap();
    assert_eq!(ack["id"], body.id.to_string());
    assert_eq!(ack["module_id"], "M1");

    let duplicate = hub
        .client
        .post(hub.url("/readings"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let latest: Value = hub
        .client
        .get(hub.url("/readings/latest?module=M1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(latest["temperature"], 24.0);
    assert!(latest["humidity"].is_null());
}

#[tokio::test]
async fn test_malformed_reading_rejected() {
    let hub = spawn_test_hub().await;

    let response = hub
        .client
        .post(hub.url("/readings"))
        .json(&json!({"module_id": "M1", "temperature": "warm"}))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(hub.storage.recent_readings(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_latest_reading_unknown_module_is_404() {
    let hub = spawn_test_hub().await;

    let response = hub
        .client
        .get(hub.url("/readings/latest?module=M9"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: Value = response.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("M9"));
}

#[tokio::test]
async fn test_ingest_triggers_alert_evaluation() {
    let hub = spawn_test_hub().await;
    hub.storage
        .upsert_thresholds(Threshold::defaults())
        .await
        .unwrap();

    let body = reading(
        "M2",
        Utc::now(),
        &[
            (Variable::Temperature, 31.5),
            (Variable::Humidity, 58.0),
            (Variable::Ammonia, 42.0),
        ],
    );
    let response = hub
        .client
        .post(hub.url("/readings"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let client = hub.client.clone();
    let alerts_url = hub.url("/alerts");
    let raised = eventually(|| {
        let client = client.clone();
        let url = alerts_url.clone();
        async move {
            let json: Value = client.get(url).send().await.unwrap().json().await.unwrap();
            json["count"] == 2
        }
    })
    .await;
    assert!(raised, "ingestion should raise two alerts");

    let critical: Value = hub
        .client
        .get(hub.url("/alerts?priority=critical"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(critical["count"], 1);
    assert_eq!(critical["alerts"][0]["variable"], "ammonia");
    assert_eq!(critical["alerts"][0]["module_id"], "M2");
    assert_eq!(critical["alerts"][0]["status"], "active");
}

#[tokio::test]
async fn test_alert_status_changes_and_stats() {
    let hub = spawn_test_hub().await;
    hub.storage
        .upsert_thresholds(Threshold::defaults())
        .await
        .unwrap();
    for (module, temp) in [("M1", 36.0), ("M2", 31.0), ("M3", 32.0)] {
        hub.storage
            .insert_reading(&reading(module, Utc::now(), &[(Variable::Temperature, temp)]))
            .await
            .unwrap();
    }

    let check: Value = hub
        .client
        .post(hub.url("/alerts/check"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(check["created"], 3);

    let stats: Value = hub
        .client
        .get(hub.url("/alerts/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats, json!({"active_critical": 1, "active_warning": 2, "resolved": 0}));

    let id = check["alerts"][0]["id"].as_i64().unwrap();
    let resolved = hub
        .client
        .put(hub.url(&format!("/alerts/{id}")))
        .json(&json!({"status": "resolved"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resolved.status(), StatusCode::OK);
    let resolved: Value = resolved.json().await.unwrap();
    assert_eq!(resolved["status"], "resolved");
    assert!(resolved["resolved_at"].is_string());

    let acknowledged: Value = hub
        .client
        .put(hub.url("/alerts/acknowledge-all"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(acknowledged["affected"], 2);

    let stats: Value = hub
        .client
        .get(hub.url("/alerts/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats, json!({"active_critical": 0, "active_warning": 0, "resolved": 1}));

    let listed: Value = hub
        .client
        .get(hub.url("/alerts?status=acknowledged&limit=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["count"], 1);

    let deleted: Value = hub
        .client
        .delete(hub.url("/alerts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["affected"], 3);
}

#[tokio::test]
async fn test_update_unknown_alert_is_404() {
    let hub = spawn_test_hub().await;

    let response = hub
        .client
        .put(hub.url("/alerts/4242"))
        .json(&json!({"status": "acknowledged"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let invalid = hub
        .client
        .put(hub.url("/alerts/1"))
        .json(&json!({"status": "closed"}))
        .send()
        .await
        .unwrap();
    assert!(invalid.status().is_client_error());
}

#[tokio::test]
async fn test_seed_defaults_only_into_empty_store() {
    let hub = spawn_test_hub().await;

    let first = hub
        .client
        .post(hub.url("/thresholds/defaults"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["action"], "created");
    assert_eq!(first["count"], 5);

    let second = hub
        .client
        .post(hub.url("/thresholds/defaults"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["action"], "none");

    let listed: Vec<Threshold> = hub
        .client
        .get(hub.url("/thresholds"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 5);
}

#[tokio::test]
async fn test_upsert_thresholds() {
    let hub = spawn_test_hub().await;

    let response = hub
        .client
        .put(hub.url("/thresholds"))
        .json(&json!([
            {"variable": "ammonia", "medium": 15.0, "high": 25.0, "critical": 35.0}
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let thresholds: Vec<Threshold> = response.json().await.unwrap();
    assert_eq!(
        thresholds,
        vec![Threshold::new(Variable::Ammonia, 15.0, 25.0, 35.0)]
    );

    let inverted = hub
        .client
        .put(hub.url("/thresholds"))
        .json(&json!([
            {"variable": "co", "medium": 10.0, "high": 50.0, "critical": 30.0}
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(inverted.status(), StatusCode::BAD_REQUEST);

    let medium_above_high = hub
        .client
        .put(hub.url("/thresholds"))
        .json(&json!([
            {"variable": "co", "medium": 25.0, "high": 20.0, "critical": 30.0}
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(medium_above_high.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reading_history_range() {
    let hub = spawn_test_hub().await;
    let now = Utc::now();

    for minutes_ago in [90, 30, 10] {
        hub.storage
            .insert_reading(&reading(
                "M1",
                now - Duration::minutes(minutes_ago),
                &[(Variable::Co2, 900.0)],
            ))
            .await
            .unwrap();
    }
    hub.storage
        .insert_reading(&reading("M2", now, &[(Variable::Co2, 950.0)]))
        .await
        .unwrap();

    let start = (now - Duration::hours(1)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let response: Value = hub
        .client
        .get(hub.url("/readings"))
        .query(&[("module", "M1"), ("start", start.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["count"], 2);
    assert_eq!(response["module"], "M1");

    let all: Value = hub
        .client
        .get(hub.url("/readings"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["count"], 4);

    let backwards = hub
        .client
        .get(hub.url("/readings"))
        .query(&[
            ("start", "2025-01-02T00:00:00Z"),
            ("end", "2025-01-01T00:00:00Z"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(backwards.status(), StatusCode::BAD_REQUEST);
}
