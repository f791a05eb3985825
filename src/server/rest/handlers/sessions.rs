use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::artifact::SourceFile;
use crate::pool::{ContainerId, Purpose};
use crate::server::rest::error::{ApiError, ApiResult};
use crate::session::{ContainerTicket, ExecutionResult, PrepareOutcome};
use crate::shared::AppState;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PrepareCompileRequest {
    /// Files to compile. When empty, the project's stored sources are used.
    #[serde(default)]
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotReadyReason {
    NoCompiledArtifacts,
    NoCapacity,
    StoreUnavailable,
    StagingFailed,
}

/// Answer to a `prepare*` call: either the coordinates to `start*` with,
/// or the reason there are none.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrepareResponse {
    pub executable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Uuid)]
    pub container_uuid: Option<ContainerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotReadyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PrepareResponse {
    fn not_ready(reason: NotReadyReason, detail: Option<String>) -> Self {
        Self {
            executable: false,
            container_uuid: None,
            ip: None,
            port: None,
            reason: Some(reason),
            detail,
        }
    }
}

impl From<PrepareOutcome> for PrepareResponse {
    fn from(outcome: PrepareOutcome) -> Self {
        match outcome {
            PrepareOutcome::Ready(ticket) => Self {
                executable: true,
                container_uuid: Some(ticket.container_uuid),
                ip: Some(ticket.ip),
                port: Some(ticket.port),
                reason: None,
                detail: None,
            },
            PrepareOutcome::NotExecutable => Self::not_ready(NotReadyReason::NoCompiledArtifacts, None),
            PrepareOutcome::Unavailable => Self::not_ready(NotReadyReason::NoCapacity, None),
            PrepareOutcome::StoreUnavailable(detail) => {
                Self::not_ready(NotReadyReason::StoreUnavailable, Some(detail))
            }
            PrepareOutcome::Failed(detail) => Self::not_ready(NotReadyReason::StagingFailed, Some(detail)),
        }
    }
}

fn parse_project(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid project id: {}", raw)))
}

pub async fn prepare_compile(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Json(req): Json<PrepareCompileRequest>,
) -> ApiResult<Json<PrepareResponse>> {
    let project = parse_project(&project)?;
    let outcome = state.binder.prepare_compile(project, req.files).await;
    Ok(Json(outcome.into()))
}

pub async fn prepare_execute(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> ApiResult<Json<PrepareResponse>> {
    let project = parse_project(&project)?;
    let outcome = state.binder.prepare_execute(project).await;
    Ok(Json(outcome.into()))
}

pub async fn prepare_test(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> ApiResult<Json<PrepareResponse>> {
    let project = parse_project(&project)?;
    let outcome = state.binder.prepare_test(project).await;
    Ok(Json(outcome.into()))
}

pub async fn start_compile(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Json(ticket): Json<ContainerTicket>,
) -> ApiResult<Json<ExecutionResult>> {
    start(&state, Purpose::Compile, &project, ticket).await
}

pub async fn start_execute(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Json(ticket): Json<ContainerTicket>,
) -> ApiResult<Json<ExecutionResult>> {
    start(&state, Purpose::Execute, &project, ticket).await
}

pub async fn start_test(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Json(ticket): Json<ContainerTicket>,
) -> ApiResult<Json<ExecutionResult>> {
    start(&state, Purpose::Test, &project, ticket).await
}

async fn start(
    state: &AppState,
    purpose: Purpose,
    project: &str,
    ticket: ContainerTicket,
) -> ApiResult<Json<ExecutionResult>> {
    let project = parse_project(project)?;
    let done = state
        .coordinator
        .start(&state.binder, purpose, project, &ticket)
        .await?;

    let response = Json(done.result);
    // Only enqueues: teardown and the replacement run on the replenish
    // workers and never hold up this response
    state.replenisher.schedule(done.spent);

    info!(
        container = %ticket.container_uuid,
        project = %project,
        purpose = %purpose,
        "Container handed to replenisher"
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::Ipv4Addr;

    #[test]
    fn ready_outcome_carries_coordinates() {
        let id: ContainerId = "6f1d3c1e-2d7c-4a8b-9b0e-7c1f2a3b4c5d".parse().unwrap();
        let response: PrepareResponse = PrepareOutcome::Ready(ContainerTicket {
            container_uuid: id,
            ip: IpAddr::V4(Ipv4Addr::new(172, 17, 0, 4)),
            port: 8080,
        })
        .into();

        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "executable": true,
                "container_uuid": "6f1d3c1e-2d7c-4a8b-9b0e-7c1f2a3b4c5d",
                "ip": "172.17.0.4",
                "port": 8080,
            })
        );
    }

    #[test]
    fn staging_failure_keeps_the_detail() {
        let response: PrepareResponse = PrepareOutcome::Failed("disk full".to_string()).into();
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({ "executable": false, "reason": "staging_failed", "detail": "disk full" })
        );
    }

    #[test]
    fn store_failure_is_not_reported_as_staging() {
        let response: PrepareResponse =
            PrepareOutcome::StoreUnavailable("could not load compiled files: 503".to_string()).into();
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "executable": false,
                "reason": "store_unavailable",
                "detail": "could not load compiled files: 503",
            })
        );
    }
}
