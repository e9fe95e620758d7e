use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use retailops_auth::AuthzError;
use retailops_infra::command_dispatcher::DispatchError;

pub type ApiResult<T> = Result<T, ApiError>;

/// An error response: `{"error": code, "message": message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err {
            DispatchError::Concurrency(_) => Self::new(StatusCode::CONFLICT, "concurrency_conflict", message),
            DispatchError::Conflict(msg) => Self::conflict(msg),
            DispatchError::Validation(msg) => Self::bad_request("validation_error", msg),
            DispatchError::InvariantViolation(msg) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
            }
            DispatchError::Unauthorized => Self::forbidden("unauthorized"),
            DispatchError::NotFound => Self::not_found("not found"),
            DispatchError::TenantIsolation(msg) => Self::new(StatusCode::FORBIDDEN, "tenant_isolation", msg),
            DispatchError::Deserialize(msg) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
            }
            DispatchError::Store(_) => {
                tracing::error!(error = %message, "event store failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
            }
            DispatchError::Publish(msg) => Self::new(StatusCode::BAD_GATEWAY, "publish_error", msg),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::TenantMismatch => Self::new(StatusCode::FORBIDDEN, "tenant_isolation", err.to_string()),
            AuthzError::Forbidden(_) | AuthzError::LocationForbidden(_) => Self::forbidden(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_error(self.status, self.code, self.message)
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
