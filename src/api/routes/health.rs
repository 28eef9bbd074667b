//! Health check endpoint

use axum::Json;
use axum::extract::State;
use tracing::warn;

use crate::api::state::ApiState;
use crate::api::types::HealthResponse;

/// GET /health
///
/// Always answers 200 while the process is up; a failing storage backend
/// only marks the relay as `degraded` since live relaying keeps working.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let (status, storage) = match state.gateway.health_check().await {
        Ok(()) => ("ok", "ok".to_string()),
        Err(e) => {
            warn!("storage health check failed: {e}");
            ("degraded", e.to_string())
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        queues: state.queues.to_vec(),
        viewers: state.hub.subscriber_count(),
        storage,
    })
}
