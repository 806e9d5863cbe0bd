//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode};

use crate::api::{error::ApiResult, state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// `503` when the storage backend does not answer its health probe
pub async fn health_check(
    State(state): State<ApiState>,
) -> ApiResult<(StatusCode, Json<HealthResponse>)> {
    let health = state.storage.health_check().await?;

    let (code, status) = if health.healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    Ok((
        code,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            storage: health.message,
        }),
    ))
}
