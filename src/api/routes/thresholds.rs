//! Threshold endpoints

use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

use crate::{
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
        types::SeedResponse,
    },
    storage::Threshold,
};

/// GET /api/v1/thresholds
pub async fn list_thresholds(State(state): State<ApiState>) -> ApiResult<Json<Vec<Threshold>>> {
    Ok(Json(state.storage.thresholds().await?))
}

/// PUT /api/v1/thresholds
///
/// Upserts the given thresholds and returns the full set
pub async fn upsert_thresholds(
    State(state): State<ApiState>,
    Json(thresholds): Json<Vec<Threshold>>,
) -> ApiResult<Json<Vec<Threshold>>> {
    for threshold in &thresholds {
        validate(threshold)?;
    }

    let count = thresholds.len();
    state.storage.upsert_thresholds(thresholds).await?;
    info!("updated {count} thresholds");

    Ok(Json(state.storage.thresholds().await?))
}

/// POST /api/v1/thresholds/defaults
///
/// Seeds the factory defaults only into an empty store. Answers `201` when
/// it wrote them and `200` when thresholds were already configured.
pub async fn seed_defaults(
    State(state): State<ApiState>,
) -> ApiResult<(StatusCode, Json<SeedResponse>)> {
    if !state.storage.thresholds().await?.is_empty() {
        return Ok((
            StatusCode::OK,
            Json(SeedResponse {
                message: "thresholds already configured".to_string(),
                action: "none".to_string(),
                count: None,
            }),
        ));
    }

    let defaults = Threshold::defaults();
    let count = defaults.len();
    state.storage.upsert_thresholds(defaults).await?;
    info!("seeded {count} default thresholds");

    Ok((
        StatusCode::CREATED,
        Json(SeedResponse {
            message: "default thresholds created".to_string(),
            action: "created".to_string(),
            count: Some(count),
        }),
    ))
}

fn validate(threshold: &Threshold) -> Result<(), ApiError> {
    let bounds = [threshold.medium, threshold.high, threshold.critical];
    if bounds.iter().any(|b| !b.is_finite()) {
        return Err(ApiError::InvalidRequest(format!(
            "thresholds for {} must be finite",
            threshold.variable
        )));
    }
    if threshold.medium > threshold.high {
        return Err(ApiError::InvalidRequest(format!(
            "medium bound for {} exceeds its high bound",
            threshold.variable
        )));
    }
    if threshold.high > threshold.critical {
        return Err(ApiError::InvalidRequest(format!(
            "high bound for {} exceeds its critical bound",
            threshold.variable
        )));
    }
    Ok(())
}
