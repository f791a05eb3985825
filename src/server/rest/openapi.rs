use utoipa::OpenApi;

use crate::artifact::{Artifact, SourceFile};
use crate::pool::{PoolSnapshot, PoolStats, Purpose};
use crate::server::rest::error::{ErrorDetails, ErrorResponse};
use crate::server::rest::handlers::{
    pool::{PoolStatusResponse, VersionResponse},
    sessions::{NotReadyReason, PrepareCompileRequest, PrepareResponse},
};
use crate::session::{ContainerTicket, ExecutionResult, ExecutionStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        version,
        pool_status,
        prepare_compile,
        start_compile,
        prepare_execute,
        start_execute,
        prepare_test,
        start_test,
    ),
    components(
        schemas(
            Artifact,
            SourceFile,
            Purpose,
            PoolSnapshot,
            PoolStats,
            PoolStatusResponse,
            VersionResponse,
            PrepareCompileRequest,
            PrepareResponse,
            NotReadyReason,
            ContainerTicket,
            ExecutionResult,
            ExecutionStatus,
            ErrorResponse,
            ErrorDetails,
        )
    ),
    tags(
        (name = "Health", description = "Service and pool status"),
        (name = "Compile", description = "Two-phase compile requests"),
        (name = "Execute", description = "Two-phase execute requests"),
        (name = "Test", description = "Two-phase test requests"),
    ),
    info(
        title = "Sandpool REST API",
        version = "0.1.0",
        description = "Pre-warmed sandbox pool for compile, execute and test requests",
        license(name = "MIT"),
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/api/v0/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
)]
#[allow(dead_code)]
pub async fn health() {}

#[utoipa::path(
    get,
    path = "/api/v0/version",
    tag = "Health",
    responses(
        (status = 200, description = "API version", body = VersionResponse),
    ),
)]
#[allow(dead_code)]
pub async fn version() {}

#[utoipa::path(
    get,
    path = "/api/v0/pool",
    tag = "Health",
    responses(
        (status = 200, description = "Idle depth, in-flight provisioning and counters", body = PoolStatusResponse),
    ),
)]
#[allow(dead_code)]
pub async fn pool_status() {}

#[utoipa::path(
    post,
    path = "/api/v0/prepareCompile/{project_uuid}",
    tag = "Compile",
    params(("project_uuid" = String, Path, description = "Project id")),
    request_body = PrepareCompileRequest,
    responses(
        (status = 200, description = "Container staged, or the reason none is available", body = PrepareResponse),
        (status = 400, description = "Malformed project id", body = ErrorResponse),
    ),
)]
#[allow(dead_code)]
pub async fn prepare_compile() {}

#[utoipa::path(
    post,
    path = "/api/v0/startCompile/{project_uuid}",
    tag = "Compile",
    params(("project_uuid" = String, Path, description = "Project id")),
    request_body = ContainerTicket,
    responses(
        (status = 200, description = "Compile finished", body = ExecutionResult),
        (status = 404, description = "No prepared container with this id", body = ErrorResponse),
        (status = 409, description = "Ticket does not match the prepared container", body = ErrorResponse),
    ),
)]
#[allow(dead_code)]
pub async fn start_compile() {}

#[utoipa::path(
    get,
    path = "/api/v0/prepareExecute/{project_uuid}",
    tag = "Execute",
    params(("project_uuid" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Container staged, or the reason none is available", body = PrepareResponse),
        (status = 400, description = "Malformed project id", body = ErrorResponse),
    ),
)]
#[allow(dead_code)]
pub async fn prepare_execute() {}

#[utoipa::path(
    post,
    path = "/api/v0/startExecute/{project_uuid}",
    tag = "Execute",
    params(("project_uuid" = String, Path, description = "Project id")),
    request_body = ContainerTicket,
    responses(
        (status = 200, description = "Execution finished", body = ExecutionResult),
        (status = 404, description = "No prepared container with this id", body = ErrorResponse),
        (status = 409, description = "Ticket does not match the prepared container", body = ErrorResponse),
    ),
)]
#[allow(dead_code)]
pub async fn start_execute() {}

#[utoipa::path(
    get,
    path = "/api/v0/prepareTest/{project_uuid}",
    tag = "Test",
    params(("project_uuid" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Container staged, or the reason none is available", body = PrepareResponse),
        (status = 400, description = "Malformed project id", body = ErrorResponse),
    ),
)]
#[allow(dead_code)]
pub async fn prepare_test() {}

#[utoipa::path(
    post,
    path = "/api/v0/startTest/{project_uuid}",
    tag = "Test",
    params(("project_uuid" = String, Path, description = "Project id")),
    request_body = ContainerTicket,
    responses(
        (status = 200, description = "Tests finished", body = ExecutionResult),
        (status = 404, description = "No prepared container with this id", body = ErrorResponse),
        (status = 409, description = "Ticket does not match the prepared container", body = ErrorResponse),
    ),
)]
#[allow(dead_code)]
pub async fn start_test() {}
