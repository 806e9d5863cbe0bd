//! Integration tests for forwarding failure handling
//!
//! Every failure is counted and the reading dropped. The pipeline keeps
//! going with the next reading.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{at, forwarder_config, message, spawn_pipeline};

fn json_reading(module: u32, temp: f64) -> (String, String) {
    (
        format!("sensor/modulo{module}/data"),
        format!(r#"{{"temp":{temp}}}"#),
    )
}

#[tokio::test]
async fn test_rejected_reading_dropped_and_next_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "db locked"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "stored"})))
        .mount(&server)
        .await;

    let (pool, ingest) = spawn_pipeline(&forwarder_config(server.uri()));

    for temp in [20.0, 21.0] {
        let (topic, payload) = json_reading(1, temp);
        ingest.submit(message(&topic, &payload, at(0))).await.unwrap();
    }

    ingest.shutdown().await.unwrap();
    let stats = pool.shutdown().await;

    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.forwarded, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unreachable_endpoint_counted() {
    // grab a free port and release it so nothing listens there
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (pool, ingest) = spawn_pipeline(&forwarder_config(format!(
        "http://127.0.0.1:{port}/api/v1/readings"
    )));

    for module in 1..=3 {
        let (topic, payload) = json_reading(module, 25.0);
        ingest.submit(message(&topic, &payload, at(0))).await.unwrap();
    }

    ingest.shutdown().await.unwrap();
    let stats = pool.shutdown().await;

    assert_eq!(stats.unreachable, 3);
    assert_eq!(stats.forwarded, 0);
    assert_eq!(stats.dropped(), 3);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut config = forwarder_config(server.uri());
    config.timeout_secs = 1;
    let (pool, ingest) = spawn_pipeline(&config);

    let (topic, payload) = json_reading(7, 30.0);
    ingest.submit(message(&topic, &payload, at(0))).await.unwrap();

    ingest.shutdown().await.unwrap();
    let stats = pool.shutdown().await;

    assert_eq!(stats.timeout, 1);
    assert_eq!(stats.forwarded, 0);
}
