//! Alert management endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use tracing::info;

use crate::{
    api::{
        error::ApiResult,
        state::ApiState,
        types::{AffectedResponse, AlertListQuery, AlertStatusUpdate, AlertsResponse, CheckResponse},
    },
    storage::{AlertFilter, AlertRecord, AlertStats},
};

const DEFAULT_LIST_LIMIT: usize = 100;

/// GET /api/v1/alerts
///
/// Newest first, optionally filtered by priority, status and module
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertListQuery>,
) -> ApiResult<Json<AlertsResponse>> {
    let alerts = state
        .storage
        .query_alerts(AlertFilter {
            priority: query.priority,
            status: query.status,
            module_id: query.module,
            limit: Some(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
        })
        .await?;

    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

/// PUT /api/v1/alerts/:id
pub async fn update_alert(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(update): Json<AlertStatusUpdate>,
) -> ApiResult<Json<AlertRecord>> {
    let alert = state
        .storage
        .update_alert_status(id, update.status, Utc::now())
        .await?;

    info!("alert {id} is now {}", alert.status);
    Ok(Json(alert))
}

/// PUT /api/v1/alerts/acknowledge-all
pub async fn acknowledge_all(State(state): State<ApiState>) -> ApiResult<Json<AffectedResponse>> {
    let affected = state.storage.acknowledge_active_alerts().await?;
    info!("acknowledged {affected} active alerts");

    Ok(Json(AffectedResponse { affected }))
}

/// GET /api/v1/alerts/stats
pub async fn alert_stats(State(state): State<ApiState>) -> ApiResult<Json<AlertStats>> {
    Ok(Json(state.storage.alert_stats().await?))
}

/// POST /api/v1/alerts/check
///
/// Runs an evaluation pass now and returns the alerts it created
pub async fn check_alerts(State(state): State<ApiState>) -> ApiResult<Json<CheckResponse>> {
    let alerts = state.evaluator.evaluate_now().await?;

    Ok(Json(CheckResponse {
        created: alerts.len(),
        alerts,
    }))
}

/// DELETE /api/v1/alerts
pub async fn delete_alerts(State(state): State<ApiState>) -> ApiResult<Json<AffectedResponse>> {
    let affected = state.storage.delete_alerts().await?;
    info!("deleted {affected} alerts");

    Ok(Json(AffectedResponse { affected }))
}
