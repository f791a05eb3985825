use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::session::BindError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A `start*` ticket that does not redeem a lease.
    #[error("Rejected: {0}")]
    Rejected(#[from] BindError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut details = None;
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.to_string()),
            ApiError::Rejected(bind) => {
                let mut fields = HashMap::new();
                let id = match bind {
                    BindError::UnknownContainer(id)
                    | BindError::AddressMismatch(id)
                    | BindError::ProjectMismatch(id)
                    | BindError::PurposeMismatch { id, .. } => id,
                };
                fields.insert("container_uuid".to_string(), serde_json::json!(id));
                details = Some(fields);

                match bind {
                    BindError::UnknownContainer(_) => (StatusCode::NOT_FOUND, "UNKNOWN_CONTAINER", bind.to_string()),
                    _ => (StatusCode::CONFLICT, "TICKET_MISMATCH", bind.to_string()),
                }
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetails {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
