//! Reading ingestion and query endpoints

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::{Duration, Utc};
use tracing::{info, instrument};

use crate::{
    Reading,
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
        types::{IngestResponse, LatestReadingQuery, ReadingRangeQuery, ReadingsResponse},
    },
    storage::ReadingQuery,
};

const DEFAULT_RANGE_LIMIT: usize = 1000;

/// POST /api/v1/readings
///
/// Persists a forwarded reading, then hands evaluation to the evaluator
/// actor. Evaluation failures never reach the caller.
#[instrument(skip_all)]
pub async fn ingest_reading(
    State(state): State<ApiState>,
    Json(reading): Json<Reading>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    if reading.module_id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("module_id must not be empty".into()));
    }

    state.storage.insert_reading(&reading).await?;
    info!(module_id = %reading.module_id, "stored reading {}", reading.id);

    state.evaluator.notify_persisted(reading.id);

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            id: reading.id,
            module_id: reading.module_id,
            status: "stored".to_string(),
        }),
    ))
}

/// GET /api/v1/readings/latest?module=M1
pub async fn latest_reading(
    State(state): State<ApiState>,
    Query(query): Query<LatestReadingQuery>,
) -> ApiResult<Json<Reading>> {
    state
        .storage
        .latest_reading(&query.module)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no readings for module {}", query.module)))
}

/// GET /api/v1/readings?module=&start=&end=&limit=
///
/// Historical readings, oldest first. Defaults to the last 24 hours.
pub async fn list_readings(
    State(state): State<ApiState>,
    Query(query): Query<ReadingRangeQuery>,
) -> ApiResult<Json<ReadingsResponse>> {
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query.start.unwrap_or(end - Duration::hours(24));

    if start > end {
        return Err(ApiError::InvalidRequest(
            "start must not be after end".to_string(),
        ));
    }

    let readings = state
        .storage
        .query_readings(ReadingQuery {
            module_id: query.module.clone(),
            start,
            end,
            limit: Some(query.limit.unwrap_or(DEFAULT_RANGE_LIMIT)),
        })
        .await?;

    Ok(Json(ReadingsResponse {
        module: query.module,
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        count: readings.len(),
        readings,
    }))
}
