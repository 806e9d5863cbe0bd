//! REST API of the monitoring hub
//!
//! Receives readings from the subscriber, persists them and exposes the
//! alert and threshold management used by the dashboard.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Storage health
//! - `POST /api/v1/readings` - Ingestion endpoint
//! - `GET /api/v1/readings` - Historical readings
//! - `GET /api/v1/readings/latest` - Latest reading of a module
//! - `GET /api/v1/alerts` - Filtered alert list
//! - `DELETE /api/v1/alerts` - Remove every alert
//! - `PUT /api/v1/alerts/{id}` - Change alert status
//! - `PUT /api/v1/alerts/acknowledge-all` - Acknowledge active alerts
//! - `GET /api/v1/alerts/stats` - Dashboard counters
//! - `POST /api/v1/alerts/check` - Run evaluation now
//! - `GET|PUT /api/v1/thresholds` - List or upsert thresholds
//! - `POST /api/v1/thresholds/defaults` - Seed factory defaults

pub mod error;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;

/// Build the router with every route and the tracing layer
pub fn build_router(state: ApiState, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route(
            "/api/v1/readings",
            post(routes::readings::ingest_reading).get(routes::readings::list_readings),
        )
        .route(
            "/api/v1/readings/latest",
            get(routes::readings::latest_reading),
        )
        .route(
            "/api/v1/alerts",
            get(routes::alerts::list_alerts).delete(routes::alerts::delete_alerts),
        )
        .route(
            "/api/v1/alerts/acknowledge-all",
            put(routes::alerts::acknowledge_all),
        )
        .route("/api/v1/alerts/stats", get(routes::alerts::alert_stats))
        .route("/api/v1/alerts/check", post(routes::alerts::check_alerts))
        .route("/api/v1/alerts/:id", put(routes::alerts::update_alert))
        .route(
            "/api/v1/thresholds",
            get(routes::thresholds::list_thresholds).put(routes::thresholds::upsert_thresholds),
        )
        .route(
            "/api/v1/thresholds/defaults",
            post(routes::thresholds::seed_defaults),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: &ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind);

    let app = build_router(state, config.enable_cors);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
