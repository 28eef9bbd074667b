//! Per-device history endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::{AlertsResponse, ReadingsResponse};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Max results (default: 50, max: 500)
    limit: Option<usize>,
}

impl HistoryQuery {
    fn limit(&self) -> ApiResult<usize> {
        match self.limit {
            None => Ok(DEFAULT_LIMIT),
            Some(0) => Err(ApiError::InvalidRequest(
                "limit must be at least 1".to_string(),
            )),
            Some(limit) => Ok(limit.min(MAX_LIMIT)),
        }
    }
}

/// GET /api/v1/devices/{mac}/readings
///
/// Most recent readings first
pub async fn recent_readings(
    State(state): State<ApiState>,
    Path(mac): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<ReadingsResponse>> {
    let readings = state.gateway.recent_readings(&mac, query.limit()?).await?;

    Ok(Json(ReadingsResponse {
        device_id: mac,
        count: readings.len(),
        readings,
    }))
}

/// GET /api/v1/devices/{mac}/alerts
pub async fn recent_alerts(
    State(state): State<ApiState>,
    Path(mac): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<AlertsResponse>> {
    let alerts = state.gateway.recent_alerts(&mac, query.limit()?).await?;

    Ok(Json(AlertsResponse {
        device_id: mac,
        count: alerts.len(),
        alerts,
    }))
}
