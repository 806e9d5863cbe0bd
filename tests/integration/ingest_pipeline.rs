//! Integration tests for the subscriber side of the pipeline
//!
//! These tests verify that:
//! - Batched JSON payloads reach the ingestion endpoint once
//! - Five legacy scalars are assembled into one forwarded reading
//! - Stale partials are never forwarded

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{at, forwarder_config, message, spawn_pipeline};

async fn ingestion_endpoint() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/readings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "stored"})))
        .mount(&server)
        .await;
    server
}

async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_json_payload_forwarded_with_present_keys_only() {
    let server = ingestion_endpoint().await;
    let config = forwarder_config(format!("{}/api/v1/readings", server.uri()));
    let (pool, ingest) = spawn_pipeline(&config);

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

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);

    let body = &bodies[0];
    assert_eq!(body["module_id"], "M2");
    assert_eq!(body["temperature"], 31.5);
    assert_eq!(body["humidity"], 58.0);
    assert_eq!(body["ammonia"], 42.0);
    assert!(body["co"].is_null());
    assert!(body["co2"].is_null());
    assert!(body["id"].is_string());
    assert!(body["captured_at"].is_string());
}

#[tokio::test]
async fn test_legacy_scalars_forwarded_as_one_reading() {
    let server = ingestion_endpoint().await;
    let config = forwarder_config(format!("{}/api/v1/readings", server.uri()));
    let (pool, ingest) = spawn_pipeline(&config);

    for (sensor, value) in [
        ("temperature", "29.3"),
        ("humidity", "61"),
        ("co", "4"),
        ("co2", "1100"),
        ("nh3", "18"),
    ] {
        ingest
            .submit(message(&format!("sensor/modulo1/{sensor}"), value, at(0)))
            .await
            .unwrap();
    }

    ingest.shutdown().await.unwrap();
    pool.shutdown().await;

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["module_id"], "M1");
    assert_eq!(bodies[0]["temperature"], 29.3);
    assert_eq!(bodies[0]["co2"], 1100.0);
    assert_eq!(bodies[0]["ammonia"], 18.0);
}

#[tokio::test]
async fn test_repeated_field_completes_with_zero_defaults() {
    let server = ingestion_endpoint().await;
    let config = forwarder_config(format!("{}/api/v1/readings", server.uri()));
    let (pool, ingest) = spawn_pipeline(&config);

    for value in ["20", "21", "22", "23", "24"] {
        ingest
            .submit(message("sensor/modulo4/temperature", value, at(0)))
            .await
            .unwrap();
    }

    ingest.shutdown().await.unwrap();
    pool.shutdown().await;

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["temperature"], 24.0);
    assert_eq!(bodies[0]["humidity"], 0.0);
    assert_eq!(bodies[0]["ammonia"], 0.0);
}

#[tokio::test]
async fn test_stale_partial_never_forwarded() {
    let server = ingestion_endpoint().await;
    let config = forwarder_config(format!("{}/api/v1/readings", server.uri()));
    let (pool, ingest) = spawn_pipeline(&config);

    for sensor in ["temperature", "humidity", "co", "co2"] {
        ingest
            .submit(message(&format!("sensor/modulo5/{sensor}"), "1", at(0)))
            .await
            .unwrap();
    }
    // another module's scalar 31s later sweeps the four-field partial
    ingest
        .submit(message("sensor/modulo6/co", "2", at(31)))
        .await
        .unwrap();

    let stats = ingest.stats().await.unwrap();
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.pending, 1);

    ingest.shutdown().await.unwrap();
    pool.shutdown().await;

    assert!(received_bodies(&server).await.is_empty());
}

#[tokio::test]
async fn test_unknown_topics_and_bad_payloads_are_ignored() {
    let server = ingestion_endpoint().await;
    let config = forwarder_config(format!("{}/api/v1/readings", server.uri()));
    let (pool, ingest) = spawn_pipeline(&config);

    for (topic, payload) in [
        ("sensor/modulo1/pressure", "1013"),
        ("sensor/modulo1/temperature", "hot"),
        ("sensor/modulo1/data", "{not json"),
        ("status/online", "1"),
    ] {
        ingest.submit(message(topic, payload, at(0))).await.unwrap();
    }

    let stats = ingest.stats().await.unwrap();
    assert_eq!(stats.received, 4);
    assert_eq!(stats.ignored, 4);
    assert_eq!(stats.pending, 0);

    ingest.shutdown().await.unwrap();
    pool.shutdown().await;

    assert!(received_bodies(&server).await.is_empty());
}
