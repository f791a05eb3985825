use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::server::rest::{handlers, logging_middleware::request_logging_middleware, openapi::ApiDoc};
use crate::shared::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let status_routes = Router::new()
        .route("/health", get(handlers::pool::health))
        .route("/version", get(handlers::pool::version))
        .route("/pool", get(handlers::pool::pool_status));

    let session_routes = Router::new()
        .route("/prepareCompile/{project_uuid}", post(handlers::sessions::prepare_compile))
        .route("/startCompile/{project_uuid}", post(handlers::sessions::start_compile))
        .route("/prepareExecute/{project_uuid}", get(handlers::sessions::prepare_execute))
        .route("/startExecute/{project_uuid}", post(handlers::sessions::start_execute))
        .route("/prepareTest/{project_uuid}", get(handlers::sessions::prepare_test))
        .route("/startTest/{project_uuid}", post(handlers::sessions::start_test));

    let api_routes = status_routes.merge(session_routes).with_state(state);

    Router::new()
        .nest("/api/v0", api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
}
