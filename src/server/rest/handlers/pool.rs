use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::pool::PoolSnapshot;
use crate::shared::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct PoolStatusResponse {
    pub pool: PoolSnapshot,
    /// Containers prepared but not yet started.
    pub leases: usize,
    pub uptime_seconds: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionResponse {
    pub version: String,
    pub api: String,
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        api: "v0".to_string(),
    })
}

pub async fn pool_status(State(state): State<Arc<AppState>>) -> Json<PoolStatusResponse> {
    Json(PoolStatusResponse {
        pool: state.pool.snapshot(),
        leases: state.binder.lease_count(),
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}
