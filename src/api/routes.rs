//! HTTP route handlers

use axum::{Json, extract::State};
use serde::Serialize;

use crate::api::error::ApiResult;
use crate::api::state::ApiState;

/// Response for GET /api/v1/health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub connected_clients: usize,
    pub broadcast_active: bool,
    pub update_count: u64,
}

/// Response for GET /api/v1/streams
#[derive(Debug, Serialize)]
pub struct StreamsResponse {
    pub streams: Vec<String>,
}

/// GET /api/v1/health
///
/// Reports liveness plus a small snapshot of the hub: connected client
/// count and the broadcast engine's current state.
pub async fn health_check(State(state): State<ApiState>) -> ApiResult<Json<HealthResponse>> {
    let status = state.broadcast.status().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        connected_clients: state.registry.len().await,
        broadcast_active: status.active,
        update_count: status.update_count,
    }))
}

/// GET /api/v1/streams
///
/// Lists the stream names currently present in the data source.
pub async fn list_streams(State(state): State<ApiState>) -> ApiResult<Json<StreamsResponse>> {
    let streams = state.source.stream_names().await?;
    Ok(Json(StreamsResponse { streams }))
}
